// ABOUTME: Sandbox configuration loaded from STACKPAD_* environment variables
// ABOUTME: Holds the install/dev command lines, the work root and watcher excludes

use std::fmt;
use std::path::PathBuf;

use stackpad_config::constants::{
    STACKPAD_DEV_COMMAND, STACKPAD_EVENT_CHANNEL_SIZE, STACKPAD_INSTALL_COMMAND,
    STACKPAD_WATCH_EXCLUDES,
};
use stackpad_config::{
    default_work_root, env_string, parse_env_list, parse_env_or_default_with_validation,
    work_root, ConfigError,
};

pub const DEFAULT_INSTALL_COMMAND: &str = "npm install";
pub const DEFAULT_DEV_COMMAND: &str = "npm run dev";
pub const DEFAULT_WATCH_EXCLUDES: &[&str] = &["node_modules", ".git"];
pub const DEFAULT_EVENT_CHANNEL_SIZE: usize = 64;

/// A program plus arguments, split from a whitespace-separated command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `name` only labels the error.
    pub fn parse(name: &str, line: &str) -> Result<Self, ConfigError> {
        let mut parts = line.split_whitespace();
        let program = parts.next().ok_or_else(|| ConfigError::EmptyCommand {
            name: name.to_string(),
        })?;
        Ok(Self::new(program, parts))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub install_command: CommandSpec,
    pub dev_command: CommandSpec,
    /// Local sandboxes are created as session directories below this root.
    pub work_root: PathBuf,
    /// Directory names skipped when reading or watching the tree.
    pub watch_excludes: Vec<String>,
    pub event_channel_size: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            install_command: CommandSpec::new("npm", ["install"]),
            dev_command: CommandSpec::new("npm", ["run", "dev"]),
            work_root: default_work_root(),
            watch_excludes: DEFAULT_WATCH_EXCLUDES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            event_channel_size: DEFAULT_EVENT_CHANNEL_SIZE,
        }
    }
}

impl SandboxConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let install_line =
            env_string(STACKPAD_INSTALL_COMMAND).unwrap_or_else(|| DEFAULT_INSTALL_COMMAND.into());
        let dev_line =
            env_string(STACKPAD_DEV_COMMAND).unwrap_or_else(|| DEFAULT_DEV_COMMAND.into());

        let event_channel_size = parse_env_or_default_with_validation(
            STACKPAD_EVENT_CHANNEL_SIZE,
            DEFAULT_EVENT_CHANNEL_SIZE,
            |v| (8..=4096).contains(&v),
        );

        Ok(Self {
            install_command: CommandSpec::parse(STACKPAD_INSTALL_COMMAND, &install_line)?,
            dev_command: CommandSpec::parse(STACKPAD_DEV_COMMAND, &dev_line)?,
            work_root: work_root(),
            watch_excludes: parse_env_list(STACKPAD_WATCH_EXCLUDES, DEFAULT_WATCH_EXCLUDES),
            event_channel_size,
        })
    }

    pub fn with_commands(mut self, install: CommandSpec, dev: CommandSpec) -> Self {
        self.install_command = install;
        self.dev_command = dev;
        self
    }

    pub fn with_work_root(mut self, work_root: impl Into<PathBuf>) -> Self {
        self.work_root = work_root.into();
        self
    }
}
