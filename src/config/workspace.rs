//! Workspace-relative settings.

pub mod storage_paths;
