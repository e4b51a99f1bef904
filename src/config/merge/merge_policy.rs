//! Defaults every composed configuration starts from.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Builder seeded with the lowest-precedence values.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("system.master", true)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")?
        .set_default("treedb.name", "treedb")
}
