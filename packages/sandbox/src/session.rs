use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle position of a sandbox session.
///
/// `Unbooted → Booting → Booted → Mounted → Installing → Running`, and from any
/// state through `TornDown` back to `Unbooted`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Unbooted,
    Booting,
    Booted,
    Mounted,
    Installing,
    Running,
    TornDown,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Unbooted => "unbooted",
            SessionState::Booting => "booting",
            SessionState::Booted => "booted",
            SessionState::Mounted => "mounted",
            SessionState::Installing => "installing",
            SessionState::Running => "running",
            SessionState::TornDown => "torn_down",
        };
        f.write_str(name)
    }
}

/// Observable snapshot of a session, published on every change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub booting: bool,
    pub installing: bool,
    pub running: bool,
    /// The dev server has announced its port.
    pub ready: bool,
    pub port: Option<u16>,
    pub preview_url: Option<String>,
    pub project_id: Option<String>,
    pub tracked_processes: usize,
    pub booted_at: Option<DateTime<Utc>>,
}

/// Outcome of one `mount_and_run` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub install_exit_code: i32,
    /// False when a dev server from an earlier run was already tracked.
    pub dev_server_spawned: bool,
}

impl RunReport {
    pub fn install_succeeded(&self) -> bool {
        self.install_exit_code == 0
    }
}
