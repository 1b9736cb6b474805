//! First-run installation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::{create_target_database, probe, EntryResponse, INSTALL_REDIRECT};
use crate::config::{ConfigLock, ConfigStore, EngineConfig, EngineKind};
use crate::core::SchemaCatalog;
use crate::error::{DbError, Result};
use crate::registry::ConnectionRegistry;

/// Result of a successful installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReport {
    pub engine: EngineKind,
    pub database_created: bool,
    pub tables_created: Vec<String>,
    /// Catalog tables that were already present and left alone.
    pub tables_existing: Vec<String>,
}

/// Sets up the system database and writes the first configuration.
pub struct InstallOrchestrator {
    registry: Arc<ConnectionRegistry>,
    store: ConfigStore,
    catalog: SchemaCatalog,
}

impl InstallOrchestrator {
    pub fn new(registry: Arc<ConnectionRegistry>, store: ConfigStore) -> Self {
        Self {
            registry,
            store,
            catalog: SchemaCatalog::system(),
        }
    }

    /// Use a different schema catalog.
    pub fn with_catalog(mut self, catalog: SchemaCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Install onto `config`.
    ///
    /// The configuration file is written only after the connection works
    /// and every catalog table exists; on failure it stays absent.
    pub async fn run(&self, config: EngineConfig) -> Result<InstallReport> {
        self.ensure_not_installed()?;
        config.validate()?;

        let _lock = ConfigLock::acquire(self.store.path())?;
        self.ensure_not_installed()?;
        info!("Installing system database on {}", config.describe());

        let adapter = self.registry.get_or_create(&config).await?;
        let mut database_created = false;
        if !probe(adapter.as_ref()).await? {
            create_target_database(&adapter).await?;
            database_created = true;
        }

        let mut tables_created = Vec::new();
        let mut tables_existing = Vec::new();
        for table in self.catalog.tables() {
            if adapter.table_exists(&table.name).await? {
                debug!("Table {} already exists", table.name);
                tables_existing.push(table.name.clone());
            } else {
                adapter.create_table_def(table).await?;
                debug!("Created table {}", table.name);
                tables_created.push(table.name.clone());
            }
        }

        self.store.save(&config)?;
        self.registry.set_system(&config).await?;
        info!(
            "Installation complete: {} tables created, {} already present",
            tables_created.len(),
            tables_existing.len()
        );

        Ok(InstallReport {
            engine: config.kind(),
            database_created,
            tables_created,
            tables_existing,
        })
    }

    fn ensure_not_installed(&self) -> Result<()> {
        if self.store.exists() {
            return Err(DbError::Config(format!(
                "already installed: configuration exists at {:?}",
                self.store.path()
            )));
        }
        Ok(())
    }
}

/// Entry point for an install request.
pub async fn handle_install(
    registry: Arc<ConnectionRegistry>,
    store: ConfigStore,
    config: EngineConfig,
) -> EntryResponse {
    match InstallOrchestrator::new(registry, store).run(config).await {
        Ok(_) => EntryResponse::ok(INSTALL_REDIRECT),
        Err(e) => {
            error!("Installation failed: {}", e);
            EntryResponse::failure(format!("Installation failed: {}", e))
        }
    }
}
