//! Connection registry.
//!
//! Holds one adapter per distinct [`EngineConfig`] for the life of the
//! process. Components receive the registry explicitly instead of reaching
//! for a global "current database".

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::core::DatabaseAdapter;
use crate::drivers::create_adapter;
use crate::error::{DbError, Result};

/// Name under which the active system database is registered.
pub const SYSTEM: &str = "system";

#[derive(Default)]
struct Entries {
    adapters: HashMap<EngineConfig, Arc<dyn DatabaseAdapter>>,
    names: HashMap<String, EngineConfig>,
}

/// Process-wide cache of adapters keyed by configuration.
///
/// Adapters are created through [`create_adapter`] at most once per
/// configuration. Creation does not connect; each adapter opens its own
/// connection on first use and keeps it.
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: Mutex<Entries>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with `config` registered as the system database.
    pub async fn with_system(config: &EngineConfig) -> Result<Self> {
        let registry = Self::new();
        registry.set_system(config).await?;
        Ok(registry)
    }

    /// Adapter for `config`, created on first request.
    pub async fn get_or_create(&self, config: &EngineConfig) -> Result<Arc<dyn DatabaseAdapter>> {
        let mut entries = self.entries.lock().await;
        Self::adapter_for(&mut entries, config)
    }

    fn adapter_for(
        entries: &mut Entries,
        config: &EngineConfig,
    ) -> Result<Arc<dyn DatabaseAdapter>> {
        if let Some(adapter) = entries.adapters.get(config) {
            return Ok(Arc::clone(adapter));
        }
        let adapter = create_adapter(config)?;
        debug!("Registered adapter for {}", config.describe());
        entries.adapters.insert(config.clone(), Arc::clone(&adapter));
        Ok(adapter)
    }

    /// Bind `name` to `config`, returning its adapter.
    ///
    /// Rebinding a name points it at the new configuration; the adapter of
    /// the previous configuration stays cached.
    pub async fn register(
        &self,
        name: &str,
        config: &EngineConfig,
    ) -> Result<Arc<dyn DatabaseAdapter>> {
        let mut entries = self.entries.lock().await;
        let adapter = Self::adapter_for(&mut entries, config)?;
        entries.names.insert(name.to_string(), config.clone());
        Ok(adapter)
    }

    /// Adapter registered under `name`.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn DatabaseAdapter>> {
        let entries = self.entries.lock().await;
        entries
            .names
            .get(name)
            .and_then(|config| entries.adapters.get(config))
            .cloned()
    }

    /// Configuration registered under `name`.
    pub async fn config_of(&self, name: &str) -> Option<EngineConfig> {
        self.entries.lock().await.names.get(name).cloned()
    }

    /// Adapter of the active system database.
    pub async fn system(&self) -> Result<Arc<dyn DatabaseAdapter>> {
        self.get(SYSTEM)
            .await
            .ok_or_else(|| DbError::Config("no system database is registered".into()))
    }

    /// Point the system entry at `config`.
    pub async fn set_system(&self, config: &EngineConfig) -> Result<Arc<dyn DatabaseAdapter>> {
        info!("System database is now {}", config.describe());
        self.register(SYSTEM, config).await
    }

    /// Number of cached adapters.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.adapters.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineKind;

    #[tokio::test]
    async fn test_same_config_same_adapter() {
        let registry = ConnectionRegistry::new();
        let config = EngineConfig::mysql("db", "app", "root", "secret");

        let a = registry.get_or_create(&config).await.unwrap();
        let b = registry.get_or_create(&config.clone()).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len().await, 1);

        let other = registry
            .get_or_create(&config.with_database("other"))
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &other));
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_named_lookup() {
        let registry = ConnectionRegistry::new();
        assert!(registry.get("reports").await.is_none());
        assert!(registry.system().await.is_err());

        let config = EngineConfig::postgres("db", "reports", "postgres", "pw");
        let registered = registry.register("reports", &config).await.unwrap();
        let found = registry.get("reports").await.unwrap();
        assert!(Arc::ptr_eq(&registered, &found));
        assert_eq!(registry.config_of("reports").await, Some(config));
    }

    #[tokio::test]
    async fn test_set_system_rebinds() {
        let dir = tempfile::tempdir().unwrap();
        let sqlite = EngineConfig::sqlite(dir.path().join("app.db").to_string_lossy());
        let registry = ConnectionRegistry::with_system(&sqlite).await.unwrap();
        assert_eq!(registry.system().await.unwrap().engine(), EngineKind::Sqlite);

        let mysql = EngineConfig::mysql("db", "app", "root", "secret");
        registry.set_system(&mysql).await.unwrap();
        assert_eq!(registry.system().await.unwrap().engine(), EngineKind::Mysql);

        // The previous adapter stays cached for direct lookups.
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_invalid_config_not_cached() {
        let registry = ConnectionRegistry::new();
        let config = EngineConfig::mysql("", "app", "root", "secret");
        assert!(registry.get_or_create(&config).await.is_err());
        assert!(registry.is_empty().await);
    }
}
