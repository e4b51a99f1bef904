//! StorageConfig and resolve_path for the record store.

use crate::config::xdg;
use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_store_path() -> PathBuf {
    PathBuf::from(".treedb/store")
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the sled record store (relative to workspace root)
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

impl StorageConfig {
    /// Resolve the store location. The default path lives under the XDG data home rather
    /// than inside the workspace.
    pub fn resolve_path(&self, workspace_root: &Path) -> Result<PathBuf, ApiError> {
        if self.store_path == default_store_path() {
            return Ok(xdg::workspace_data_dir(workspace_root)?.join("store"));
        }
        Ok(workspace_root.join(&self.store_path))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
        }
    }
}
