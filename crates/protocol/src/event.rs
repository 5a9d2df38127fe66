use crate::record::{normalize_path, unix_now_ms};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Add,
    Modify,
    Delete,
}

/// A single file-system change reported by the external watcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub path: String,
    pub change_type: ChangeType,
    pub timestamp_unix_ms: u64,
}

impl ChangeEvent {
    pub fn new(path: impl Into<String>, change_type: ChangeType) -> Self {
        Self {
            path: normalize_path(&path.into()),
            change_type,
            timestamp_unix_ms: unix_now_ms(),
        }
    }

    pub fn modified(path: impl Into<String>) -> Self {
        Self::new(path, ChangeType::Modify)
    }

    pub fn added(path: impl Into<String>) -> Self {
        Self::new(path, ChangeType::Add)
    }

    pub fn deleted(path: impl Into<String>) -> Self {
        Self::new(path, ChangeType::Delete)
    }
}
