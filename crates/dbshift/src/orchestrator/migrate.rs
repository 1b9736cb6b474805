//! Migration of the system database to another engine.
//!
//! The run moves every catalog table, schema and rows, from the active
//! database to the target and switches the persisted configuration only
//! after the target transaction has committed. Source and target are
//! different servers, so atomicity is enforced here rather than by a single
//! database transaction:
//!
//! - engines with transactional DDL create and fill every table inside one
//!   transaction, so a rollback removes everything;
//! - MySQL commits DDL implicitly, so all tables are created first, rows are
//!   copied in one transaction, and on failure the created tables are
//!   dropped again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::{create_target_database, probe, EntryResponse, MigrationPhase, MIGRATION_REDIRECT};
use crate::config::{ConfigLock, ConfigStore, EngineConfig, EngineKind};
use crate::core::{DatabaseAdapter, SchemaCatalog, TableDef};
use crate::error::{DbError, Result};
use crate::registry::ConnectionRegistry;

/// Rows copied into one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReport {
    pub name: String,
    pub rows: u64,
}

/// Result of a successful migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Engine migrated from.
    pub source: EngineKind,

    /// Engine migrated to.
    pub target: EngineKind,

    /// Whether the target database had to be created.
    pub database_created: bool,

    /// Per-table row counts in catalog order.
    pub tables: Vec<TableReport>,

    /// Total rows copied.
    pub rows_copied: u64,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,
}

/// Moves the system database to a server engine.
pub struct MigrationOrchestrator {
    registry: Arc<ConnectionRegistry>,
    store: ConfigStore,
    catalog: SchemaCatalog,
    phase: MigrationPhase,
    failed_in: Option<MigrationPhase>,
}

impl MigrationOrchestrator {
    /// Create an orchestrator over the built-in system catalog.
    pub fn new(registry: Arc<ConnectionRegistry>, store: ConfigStore) -> Self {
        Self {
            registry,
            store,
            catalog: SchemaCatalog::system(),
            phase: MigrationPhase::Idle,
            failed_in: None,
        }
    }

    /// Use a different schema catalog.
    pub fn with_catalog(mut self, catalog: SchemaCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Current phase.
    pub fn phase(&self) -> MigrationPhase {
        self.phase
    }

    /// Phase the last failed run was in, if it failed.
    pub fn failed_in(&self) -> Option<MigrationPhase> {
        self.failed_in
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Migrate the active database to `target`.
    ///
    /// On success the configuration file points at `target` and the
    /// registry's system entry follows it. On failure both are unchanged and
    /// the target holds none of the catalog's tables.
    pub async fn run(&mut self, target: EngineConfig) -> Result<MigrationReport> {
        if !target.kind().is_server() {
            return Err(DbError::Config(format!(
                "migration target must be a server engine, got {}",
                target.kind()
            )));
        }
        self.migrate(&target).await
    }

    /// User-facing description of a failure, naming the phase it stopped in.
    pub fn failure_message(&self, err: &DbError) -> String {
        match self.failed_in {
            Some(MigrationPhase::Idle) | None => format!("Migration failed: {}", err),
            Some(phase) => format!("Migration failed while {}: {}", phase, err),
        }
    }

    async fn migrate(&mut self, target: &EngineConfig) -> Result<MigrationReport> {
        self.failed_in = None;
        let result = self.execute(target).await;
        if let Err(e) = &result {
            error!(
                "Migration to {} failed while {}: {}",
                target.describe(),
                self.phase,
                e
            );
            self.failed_in = Some(self.phase);
            self.phase = MigrationPhase::Idle;
        }
        result
    }

    async fn execute(&mut self, target: &EngineConfig) -> Result<MigrationReport> {
        target.validate()?;
        let current = self.store.require()?;
        if current == *target {
            return Err(DbError::Config(
                "target is the active database configuration".into(),
            ));
        }

        let _lock = ConfigLock::acquire(self.store.path())?;
        let started_at = Utc::now();
        info!("Migrating {} to {}", current.describe(), target.describe());

        let source = self.registry.get_or_create(&current).await?;
        let destination = self.registry.get_or_create(target).await?;
        source.connect().await?;

        self.transition(MigrationPhase::ProbingTarget);
        let mut database_created = false;
        if !probe(destination.as_ref()).await? {
            self.transition(MigrationPhase::PreparingTarget);
            create_target_database(&destination).await?;
            database_created = true;
        }

        self.transition(MigrationPhase::CopyingSchemaAndData);
        let tables = copy_catalog(source.as_ref(), destination.as_ref(), &self.catalog).await?;

        self.transition(MigrationPhase::Committed);
        self.store.save(target)?;
        self.registry.set_system(target).await?;

        let completed_at = Utc::now();
        let rows_copied = tables.iter().map(|t| t.rows).sum();
        let report = MigrationReport {
            source: current.kind(),
            target: target.kind(),
            database_created,
            tables,
            rows_copied,
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
        };
        info!(
            "Migration complete: {} tables, {} rows in {:.1}s",
            report.tables.len(),
            report.rows_copied,
            report.duration_seconds
        );
        Ok(report)
    }

    fn transition(&mut self, phase: MigrationPhase) {
        info!("Migration phase: {}", phase);
        self.phase = phase;
    }
}

/// Entry point for a migration request.
pub async fn handle_migration(
    registry: Arc<ConnectionRegistry>,
    store: ConfigStore,
    target: EngineConfig,
) -> EntryResponse {
    let mut orchestrator = MigrationOrchestrator::new(registry, store);
    match orchestrator.run(target).await {
        Ok(_) => EntryResponse::ok(MIGRATION_REDIRECT),
        Err(e) => EntryResponse::failure(orchestrator.failure_message(&e)),
    }
}

/// Copy every catalog table from `source` to `target`, all or nothing.
pub(crate) async fn copy_catalog(
    source: &dyn DatabaseAdapter,
    target: &dyn DatabaseAdapter,
    catalog: &SchemaCatalog,
) -> Result<Vec<TableReport>> {
    if target.transactional_ddl() {
        copy_in_transaction(source, target, catalog).await
    } else {
        copy_with_compensation(source, target, catalog).await
    }
}

async fn copy_in_transaction(
    source: &dyn DatabaseAdapter,
    target: &dyn DatabaseAdapter,
    catalog: &SchemaCatalog,
) -> Result<Vec<TableReport>> {
    target.begin_transaction().await?;
    let result: Result<Vec<TableReport>> = async {
        let mut reports = Vec::with_capacity(catalog.len());
        for table in catalog.tables() {
            target.drop_table_if_exists(&table.name).await?;
            target.create_table_def(table).await?;
            reports.push(copy_rows(source, target, table).await?);
        }
        target.commit().await?;
        Ok(reports)
    }
    .await;

    if result.is_err() {
        abort(target).await;
    }
    result
}

async fn copy_with_compensation(
    source: &dyn DatabaseAdapter,
    target: &dyn DatabaseAdapter,
    catalog: &SchemaCatalog,
) -> Result<Vec<TableReport>> {
    let mut created: Vec<&str> = Vec::with_capacity(catalog.len());
    let result: Result<Vec<TableReport>> = async {
        for table in catalog.tables() {
            target.drop_table_if_exists(&table.name).await?;
            target.create_table_def(table).await?;
            created.push(&table.name);
        }

        target.begin_transaction().await?;
        let mut reports = Vec::with_capacity(catalog.len());
        for table in catalog.tables() {
            reports.push(copy_rows(source, target, table).await?);
        }
        target.commit().await?;
        Ok(reports)
    }
    .await;

    if result.is_err() {
        abort(target).await;
        for name in created.iter().rev() {
            match target.drop_table_if_exists(name).await {
                Ok(()) => debug!("Dropped partially migrated table {}", name),
                Err(e) => warn!("Could not drop partially migrated table {}: {}", name, e),
            }
        }
    }
    result
}

async fn copy_rows(
    source: &dyn DatabaseAdapter,
    target: &dyn DatabaseAdapter,
    table: &TableDef,
) -> Result<TableReport> {
    let rows = source.fetch_all(&table.name).await?;
    debug!("Copying {} rows into {}", rows.len(), table.name);
    for row in &rows.rows {
        target.insert_row(&table.name, &rows.columns, row).await?;
    }
    target.sync_auto_increment(table).await?;
    info!("Copied {} ({} rows)", table.name, rows.len());
    Ok(TableReport {
        name: table.name.clone(),
        rows: rows.len() as u64,
    })
}

async fn abort(target: &dyn DatabaseAdapter) {
    if !target.in_transaction() {
        return;
    }
    match target.rollback().await {
        Ok(()) => info!("Rolled back target transaction"),
        Err(e) => warn!("Rollback on {} failed: {}", target.config().describe(), e),
    }
}
