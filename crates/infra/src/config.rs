//! Engine configuration.
//!
//! Loaded in layers:
//! 1. defaults in code
//! 2. optional `config/stockbook.toml`
//! 3. `STOCKBOOK__*` environment variables (e.g. `STOCKBOOK__COSTING_METHOD=lifo`)

use std::time::Duration;

use config::{ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use stockbook_inventory::CostingMethod;

pub const DEFAULT_CONFIG_PATH: &str = "config/stockbook";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Layer consumption order for outflows.
    #[serde(default)]
    pub costing_method: CostingMethod,

    /// Upper bound on waiting for a key lease; unbounded when unset.
    #[serde(default)]
    pub lock_timeout_ms: Option<u64>,
}

impl EngineConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// `path` is passed to `config::File::with_name` (extension optional).
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        config::Config::builder()
            .set_default("costing_method", "fifo")?
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("STOCKBOOK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Parse a TOML document (no environment overlay).
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        config::Config::builder()
            .set_default("costing_method", "fifo")?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }
}
