//! # dbshift
//!
//! Uniform adapter layer over SQLite, MySQL/MariaDB and PostgreSQL, with
//! install and all-or-nothing migration of the system database between them.
//!
//! - **Adapters** expose one contract for connection, introspection, schema
//!   changes, transactions and maintenance on every engine
//! - **Dialects** render engine-specific SQL from structured table
//!   descriptions, no string rewriting
//! - **Install** creates the target database and system tables before the
//!   configuration is first written
//! - **Migration** copies schema and rows to a server engine and switches the
//!   configuration only after the target has committed
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use dbshift::{ConfigStore, ConnectionRegistry, EngineConfig, MigrationOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> dbshift::Result<()> {
//!     let store = ConfigStore::new("config/database.yaml");
//!     let registry = Arc::new(ConnectionRegistry::with_system(&store.require()?).await?);
//!
//!     let target = EngineConfig::postgres("db.internal", "app", "app", "secret");
//!     let report = MigrationOrchestrator::new(registry, store).run(target).await?;
//!     println!("Copied {} rows", report.rows_copied);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod registry;

// Re-exports for convenient access
pub use config::{ConfigLock, ConfigStore, EngineConfig, EngineKind};
pub use core::{
    ColumnDef, ColumnDefault, ColumnInfo, ColumnType, DatabaseAdapter, DateUnit, Dialect, RowSet,
    SchemaCatalog, SqlValue, TableDef,
};
pub use drivers::{admin_adapter, create_adapter, DialectImpl};
pub use error::{DbError, Result};
pub use orchestrator::{
    handle_install, handle_migration, EntryResponse, InstallOrchestrator, InstallReport,
    MigrationOrchestrator, MigrationPhase, MigrationReport,
};
pub use registry::ConnectionRegistry;
