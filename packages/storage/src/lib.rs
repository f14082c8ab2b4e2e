// ABOUTME: Persistence of project file trees keyed by project id
// ABOUTME: Defines the ProjectStore trait with in-memory and JSON-file implementations

use async_trait::async_trait;
use stackpad_filetree::FileTree;
use thiserror::Error;

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryProjectStore;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid project ID '{project_id}': {reason}")]
    InvalidProjectId { project_id: String, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Where project trees are saved between sessions.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Replace the stored tree for `project_id`.
    async fn save(&self, project_id: &str, tree: &FileTree) -> StorageResult<()>;

    /// The stored tree, or `None` if the project was never saved.
    async fn load(&self, project_id: &str) -> StorageResult<Option<FileTree>>;
}

/// Project ids double as file names, so only alphanumerics, `-` and `_` are
/// accepted.
pub fn validate_project_id(project_id: &str) -> StorageResult<()> {
    if project_id.is_empty() {
        return Err(StorageError::InvalidProjectId {
            project_id: project_id.to_string(),
            reason: "Project ID cannot be empty".to_string(),
        });
    }

    if !project_id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(StorageError::InvalidProjectId {
            project_id: project_id.to_string(),
            reason: "Project ID can only contain alphanumeric characters, hyphens, and underscores"
                .to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("my-project")]
    #[case("my_project")]
    #[case("Project-Name_123")]
    fn test_validate_project_id_valid(#[case] id: &str) {
        assert!(validate_project_id(id).is_ok());
    }

    #[rstest]
    #[case("")]
    #[case("../etc")]
    #[case("a/b")]
    #[case("a\\b")]
    #[case("has space")]
    #[case("dot.json")]
    fn test_validate_project_id_invalid(#[case] id: &str) {
        assert!(matches!(
            validate_project_id(id),
            Err(StorageError::InvalidProjectId { .. })
        ));
    }
}
