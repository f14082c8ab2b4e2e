// ABOUTME: Well-known filesystem locations for Stackpad data
// ABOUTME: Resolves the ~/.stackpad home and the default project store directory

use std::path::PathBuf;

use tracing::warn;

use crate::constants::{HOME, STACKPAD_STORE_DIR, STACKPAD_WORK_ROOT};
use crate::env::env_string;

/// `~/.stackpad`. HOME wins over platform lookup so tests can redirect it.
pub fn stackpad_dir() -> PathBuf {
    if let Some(home) = env_string(HOME) {
        return PathBuf::from(home).join(".stackpad");
    }
    let home_dir = dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    });
    home_dir.join(".stackpad")
}

/// Directory of the JSON project store (`STACKPAD_STORE_DIR` or
/// `~/.stackpad/projects`).
pub fn store_dir() -> PathBuf {
    env_string(STACKPAD_STORE_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|| stackpad_dir().join("projects"))
}

/// Host directory under which local sandboxes are created.
pub fn work_root() -> PathBuf {
    env_string(STACKPAD_WORK_ROOT)
        .map(PathBuf::from)
        .unwrap_or_else(default_work_root)
}

pub fn default_work_root() -> PathBuf {
    std::env::temp_dir().join("stackpad")
}
