use std::collections::HashMap;

use async_trait::async_trait;
use stackpad_filetree::FileTree;
use tokio::sync::RwLock;

use crate::{validate_project_id, ProjectStore, StorageResult};

/// Process-local store, mainly for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    projects: RwLock<HashMap<String, FileTree>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn project_count(&self) -> usize {
        self.projects.read().await.len()
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn save(&self, project_id: &str, tree: &FileTree) -> StorageResult<()> {
        validate_project_id(project_id)?;
        self.projects
            .write()
            .await
            .insert(project_id.to_string(), tree.clone());
        Ok(())
    }

    async fn load(&self, project_id: &str) -> StorageResult<Option<FileTree>> {
        validate_project_id(project_id)?;
        Ok(self.projects.read().await.get(project_id).cloned())
    }
}
