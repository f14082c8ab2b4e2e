use serde::{Deserialize, Serialize};
use stackpad_filetree::FileTree;

/// Completion state of one generated file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    Processing,
    Completed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Processing => "processing",
            FileStatus::Completed => "completed",
        }
    }
}

/// Progress entry for a distinct file path seen in the buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileProgress {
    pub path: String,
    pub status: FileStatus,
}

/// Structured view of one streamed model reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub introduction: String,
    pub title: String,
    pub file_tree: FileTree,
    /// One entry per distinct path, ordered by first appearance.
    pub file_progress: Vec<FileProgress>,
    pub conclusion: String,
}

impl Artifact {
    pub fn has_files(&self) -> bool {
        !self.file_progress.is_empty()
    }

    /// True while any file is still being written.
    pub fn is_processing(&self) -> bool {
        self.file_progress
            .iter()
            .any(|file| file.status == FileStatus::Processing)
    }

    pub fn status_of(&self, path: &str) -> Option<FileStatus> {
        self.file_progress
            .iter()
            .find(|file| file.path == path)
            .map(|file| file.status)
    }

    pub fn completed_paths(&self) -> impl Iterator<Item = &str> {
        self.file_progress
            .iter()
            .filter(|file| file.status == FileStatus::Completed)
            .map(|file| file.path.as_str())
    }
}
