// ABOUTME: Sandbox session management for running generated projects
// ABOUTME: Exposes the SandboxManager orchestrator, runtime traits and the local host runtime

pub mod config;
pub mod error;
pub mod manager;
pub mod runtime;
pub mod session;
pub mod terminal;

pub use config::{CommandSpec, SandboxConfig};
pub use error::{Result, SandboxError};
pub use manager::SandboxManager;
pub use runtime::{
    LocalInstance, LocalRuntime, ProcessControl, SandboxInstance, SandboxProcess, SandboxRuntime,
    ServerReady, WatchEvent, WatchEventKind, WatchSubscription,
};
pub use session::{RunReport, SessionState, SessionStatus};
pub use terminal::{TerminalSink, TerminalSlot};
