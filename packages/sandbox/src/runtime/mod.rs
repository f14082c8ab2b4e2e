// ABOUTME: Runtime traits for sandbox backends that host a project's files and processes
// ABOUTME: A runtime boots instances; an instance mounts trees, spawns processes and watches files

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use stackpad_filetree::FileTree;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use crate::config::CommandSpec;
use crate::error::Result;

pub mod local;
pub mod ports;

pub use local::{LocalInstance, LocalRuntime};

/// Factory for sandbox instances.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    async fn boot(&self) -> Result<Arc<dyn SandboxInstance>>;
}

/// A booted sandbox.
#[async_trait]
pub trait SandboxInstance: Send + Sync {
    /// Write every file of `tree` into the sandbox, overwriting existing ones.
    async fn mount(&self, tree: &FileTree) -> Result<()>;

    async fn spawn(&self, command: &CommandSpec) -> Result<SandboxProcess>;

    /// Watch `path` (relative to the sandbox root, `"."` for everything).
    async fn watch(&self, path: &str) -> Result<WatchSubscription>;

    /// Receives an event each time a dev server announces where it listens.
    fn server_ready(&self) -> broadcast::Receiver<ServerReady>;

    async fn read_tree(&self) -> Result<FileTree>;

    async fn teardown(&self) -> Result<()>;
}

#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Force termination. Killing an already exited process is not an error.
    async fn kill(&self) -> Result<()>;
}

pub struct SandboxProcess {
    pub id: Uuid,
    pub command: String,
    /// Output chunks in arrival order; closes when the process exits.
    pub output: mpsc::UnboundedReceiver<String>,
    /// Exit code. Dropped without a value when the process could not be reaped.
    pub exit: oneshot::Receiver<i32>,
    pub control: Arc<dyn ProcessControl>,
}

impl std::fmt::Debug for SandboxProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxProcess")
            .field("id", &self.id)
            .field("command", &self.command)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerReady {
    pub port: u16,
    pub url: String,
}

impl ServerReady {
    pub fn localhost(port: u16) -> Self {
        Self {
            port,
            url: format!("http://localhost:{}", port),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchEventKind {
    Created,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: String,
}

/// Live file watch. Dropping the subscription stops the watcher.
#[derive(Debug)]
pub struct WatchSubscription {
    pub events: mpsc::UnboundedReceiver<WatchEvent>,
}
