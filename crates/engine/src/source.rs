use crate::error::{EngineError, Result};
use async_trait::async_trait;
use context_protocol::{normalize_path, FileRecord};
use std::path::PathBuf;

/// The parser collaborator: turns a repo-relative path into an analyzed record
#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn load(&self, path: &str) -> Result<FileRecord>;
}

/// Reads files under `root` into content-only records (no symbols).
/// Hosts with a real parser plug in their own provider.
#[derive(Debug, Clone)]
pub struct FsSourceProvider {
    root: PathBuf,
}

impl FsSourceProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SourceProvider for FsSourceProvider {
    async fn load(&self, path: &str) -> Result<FileRecord> {
        let path = normalize_path(path);
        let content = tokio::fs::read_to_string(self.root.join(&path))
            .await
            .map_err(|e| EngineError::Source {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        Ok(FileRecord::from_source(path, content))
    }
}
