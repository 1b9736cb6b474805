//! Configuration types, validation and persistence.

mod lock;
mod store;
mod types;
mod validation;

pub use lock::{ConfigLock, STALE_LOCK_AGE};
pub use store::ConfigStore;
pub use types::*;

use crate::error::Result;

impl EngineConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Parse a configuration from a YAML string and validate it.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }
}
