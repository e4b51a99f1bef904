//! Configuration
//!
//! Layered configuration with the `config` crate: defaults, global file, workspace files,
//! then `TREEDB__*` environment variables.

pub mod merge;
pub mod paths;
pub mod sources;
pub mod workspace;

pub use paths::xdg_root as xdg;
pub use workspace::storage_paths::StorageConfig;

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::treedb::OpenOptions;
use config::ConfigError;
use merge::service::MergeService;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreedbConfig {
    #[serde(default)]
    pub system: SystemConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub treedb: TreedbSettings,
}

impl TreedbConfig {
    /// Layered configuration of a workspace, or one explicit file over the defaults.
    pub fn load(workspace_root: &Path, config_path: Option<&Path>) -> Result<Self, ConfigError> {
        match config_path {
            Some(path) => MergeService::load_from_file(path),
            None => MergeService::load(workspace_root),
        }
    }

    /// How the configured treedb is opened
    pub fn open_options(&self) -> OpenOptions {
        OpenOptions {
            name: self.treedb.name.clone(),
            master: self.system.master,
        }
    }

    /// Record store location for a workspace
    pub fn store_path(&self, workspace_root: &Path) -> Result<PathBuf, ApiError> {
        self.system.storage.resolve_path(workspace_root)
    }

    /// Schema document location, if one is configured
    pub fn schema_path(&self, workspace_root: &Path) -> Option<PathBuf> {
        self.treedb
            .schema_path
            .as_ref()
            .map(|path| workspace_root.join(path))
    }
}

/// Process-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    /// Only a master writes; replicas reject every mutation
    #[serde(default = "default_true")]
    pub master: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            master: true,
        }
    }
}

/// The treedb served by this process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreedbSettings {
    #[serde(default = "default_name")]
    pub name: String,

    /// Schema document (JSON or YAML)
    #[serde(default)]
    pub schema_path: Option<PathBuf>,

    /// Principal the CLI acts as
    #[serde(default = "default_principal")]
    pub principal: String,
}

impl Default for TreedbSettings {
    fn default() -> Self {
        Self {
            name: default_name(),
            schema_path: None,
            principal: default_principal(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_name() -> String {
    "treedb".to_string()
}

fn default_principal() -> String {
    "cli".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_settings_flow_into_open_options() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("treedb.toml"),
            "[treedb]\nname = \"org\"\nschema_path = \"schema.yaml\"\n\n\
             [system]\nmaster = false\n\n[system.storage]\nstore_path = \"data/store\"\n",
        )
        .unwrap();

        let config = TreedbConfig::load(dir.path(), None).unwrap();
        let options = config.open_options();
        assert_eq!(options.name, "org");
        assert!(!options.master);
        assert_eq!(config.store_path(dir.path()).unwrap(), dir.path().join("data/store"));
        assert_eq!(config.schema_path(dir.path()), Some(dir.path().join("schema.yaml")));
    }

    #[test]
    fn test_explicit_file_skips_workspace_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("treedb.toml"), "[treedb]\nname = \"org\"\n").unwrap();
        let path = dir.path().join("other.toml");
        fs::write(&path, "[treedb]\nname = \"replica\"\n").unwrap();

        let config = TreedbConfig::load(dir.path(), Some(&path)).unwrap();
        assert_eq!(config.open_options().name, "replica");
        assert!(config.open_options().master);
        assert!(config.schema_path(dir.path()).is_none());
    }
}
