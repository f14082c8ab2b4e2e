// ABOUTME: File-backed project store writing one pretty-printed JSON tree per project
// ABOUTME: Writes go through a temp file and rename so a crash never leaves a torn tree

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use stackpad_filetree::FileTree;
use tokio::fs;
use tracing::debug;

use crate::{validate_project_id, ProjectStore, StorageResult};

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at `STACKPAD_STORE_DIR` or `~/.stackpad/projects`.
    pub fn from_env() -> Self {
        Self::new(stackpad_config::store_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn project_path(&self, project_id: &str) -> StorageResult<PathBuf> {
        validate_project_id(project_id)?;
        Ok(self.dir.join(format!("{}.json", project_id)))
    }
}

#[async_trait]
impl ProjectStore for JsonFileStore {
    async fn save(&self, project_id: &str, tree: &FileTree) -> StorageResult<()> {
        let path = self.project_path(project_id)?;
        fs::create_dir_all(&self.dir).await?;

        let json = serde_json::to_string_pretty(tree)?;
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, json).await?;
        fs::rename(&temp_path, &path).await?;

        debug!("Saved project '{}' to {}", project_id, path.display());
        Ok(())
    }

    async fn load(&self, project_id: &str) -> StorageResult<Option<FileTree>> {
        let path = self.project_path(project_id)?;
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }
}
