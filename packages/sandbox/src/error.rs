use stackpad_filetree::TreeError;
use stackpad_storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Sandbox boot failed: {reason}")]
    BootFailed { reason: String },

    #[error("Sandbox is not booted")]
    NotBooted,

    #[error("Mount failed: {0}")]
    Mount(String),

    #[error("Failed to spawn '{command}': {error}")]
    ProcessSpawn { command: String, error: String },

    #[error("Failed to kill process: {0}")]
    ProcessKill(String),

    #[error("Sandbox teardown failed: {0}")]
    Teardown(String),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Session was torn down while the operation was in flight")]
    TornDown,

    #[error("No project is open")]
    NoActiveProject,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SandboxError>;
