//! Environment variable source: TREEDB prefix with __ separator

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

/// Add environment variable overlay to builder.
/// `TREEDB__SYSTEM__MASTER=false` sets `system.master`.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(builder.add_source(
        Environment::with_prefix("TREEDB")
            .separator("__")
            .try_parsing(true),
    ))
}
