// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names used across Stackpad

// Sandbox Process Configuration
pub const STACKPAD_INSTALL_COMMAND: &str = "STACKPAD_INSTALL_COMMAND";
pub const STACKPAD_DEV_COMMAND: &str = "STACKPAD_DEV_COMMAND";

// Local Runtime Configuration
pub const STACKPAD_WORK_ROOT: &str = "STACKPAD_WORK_ROOT";
pub const STACKPAD_WATCH_EXCLUDES: &str = "STACKPAD_WATCH_EXCLUDES";

// Event Channels
pub const STACKPAD_EVENT_CHANNEL_SIZE: &str = "STACKPAD_EVENT_CHANNEL_SIZE";

// Project Storage
pub const STACKPAD_STORE_DIR: &str = "STACKPAD_STORE_DIR";

// Logging
pub const RUST_LOG: &str = "RUST_LOG";

// System Environment Variables
pub const HOME: &str = "HOME";
