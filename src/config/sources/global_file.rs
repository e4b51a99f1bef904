//! Global file source: `$XDG_CONFIG_HOME/treedb/config.toml`

use crate::config::xdg;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File};

/// Add the global config file when one can be located; a missing file is fine.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let Ok(config_home) = xdg::config_home() else {
        return Ok(builder);
    };
    let path = config_home.join("treedb").join("config.toml");
    Ok(builder.add_source(File::from(path).required(false)))
}
