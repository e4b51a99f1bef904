//! XDG Base Directory locations of treedb data and configuration.

use crate::error::ApiError;
use std::path::{Component, Path, PathBuf};

/// `$XDG_DATA_HOME`, or `$HOME/.local/share`
pub fn data_home() -> Option<PathBuf> {
    if let Ok(xdg_data_home) = std::env::var("XDG_DATA_HOME") {
        return Some(PathBuf::from(xdg_data_home));
    }

    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".local").join("share"))
}

/// `$XDG_CONFIG_HOME`, or `$HOME/.config`
pub fn config_home() -> Result<PathBuf, ApiError> {
    if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg_config_home));
    }

    let home = std::env::var("HOME").map_err(|_| {
        ApiError::ConfigError(
            "Could not determine XDG config home directory (HOME not set)".to_string(),
        )
    })?;

    Ok(PathBuf::from(home).join(".config"))
}

/// Data directory of one workspace: `$XDG_DATA_HOME/treedb/<canonical workspace path>/`
pub fn workspace_data_dir(workspace_root: &Path) -> Result<PathBuf, ApiError> {
    let data_home = data_home().ok_or_else(|| {
        ApiError::ConfigError(
            "Could not determine XDG data home directory (HOME not set)".to_string(),
        )
    })?;
    append_canonical(data_home.join("treedb"), workspace_root)
}

/// `base` followed by the normal components of the canonical form of `path`
pub fn append_canonical(base: PathBuf, path: &Path) -> Result<PathBuf, ApiError> {
    let canonical = dunce::canonicalize(path).map_err(|e| {
        ApiError::ConfigError(format!("Failed to canonicalize workspace path: {}", e))
    })?;

    Ok(canonical
        .components()
        .fold(base, |dir, component| match component {
            Component::Normal(name) => dir.join(name),
            _ => dir,
        }))
}
