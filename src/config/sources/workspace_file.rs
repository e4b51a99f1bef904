//! Workspace file sources: `treedb.toml`, then `treedb.<TREEDB_ENV>.toml`

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File};
use std::path::Path;

pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let mut builder =
        builder.add_source(File::from(workspace_root.join("treedb.toml")).required(false));
    if let Ok(env) = std::env::var("TREEDB_ENV") {
        if !env.is_empty() {
            let path = workspace_root.join(format!("treedb.{}.toml", env));
            builder = builder.add_source(File::from(path).required(false));
        }
    }
    Ok(builder)
}
