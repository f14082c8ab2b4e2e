// ABOUTME: Shared configuration surface for Stackpad packages
// ABOUTME: Env-var names plus parsing helpers and the command-line config error type

pub mod constants;
pub mod env;
pub mod paths;

pub use env::{env_string, parse_env_list, parse_env_or_default_with_validation};
pub use paths::{default_work_root, stackpad_dir, store_dir, work_root};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Command for {name} is empty")]
    EmptyCommand { name: String },
}
