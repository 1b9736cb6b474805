//! Database driver implementations.
//!
//! This module provides engine-specific implementations of the core traits:
//!
//! - [`sqlite`]: embedded SQLite driver (sqlx)
//! - [`mysql`]: MySQL/MariaDB driver (sqlx)
//! - [`postgres`]: PostgreSQL driver (tokio-postgres)
//! - [`common`]: shared utilities (TLS, transaction bookkeeping)
//!
//! # Architecture
//!
//! Each driver module implements:
//! - `Dialect`: SQL syntax strategy for the engine
//! - `DatabaseAdapter`: the connection-owning adapter
//!
//! [`create_adapter`] is the factory: it dispatches on the configuration's
//! engine type and never opens a connection.
//!
//! # Adding New Databases
//!
//! 1. Create a new module under `drivers/`
//! 2. Implement `Dialect` and `DatabaseAdapter`
//! 3. Add a variant to `EngineKind` and to `DialectImpl`
//! 4. Add the match arms in [`create_adapter`] and [`admin_adapter`]

pub mod common;
pub mod mysql;
pub mod postgres;
pub mod sqlite;

use std::sync::Arc;

use tracing::debug;

// Re-export common utilities
pub use common::{SslMode, TlsBuilder};

// Re-export driver types
pub use mysql::{MysqlAdapter, MysqlDialect};
pub use postgres::{PostgresAdapter, PostgresDialect};
pub use sqlite::{SqliteAdapter, SqliteDialect};

use crate::config::{EngineConfig, EngineKind};
use crate::core::schema::{ColumnDef, ColumnDefault, ColumnType, TableDef};
use crate::core::traits::{DatabaseAdapter, DateUnit, Dialect};
use crate::error::{DbError, Result};

/// Create the adapter for a configuration.
///
/// Dispatches on `config.type`. The configuration is validated but no
/// connection is opened; that happens on first use.
pub fn create_adapter(config: &EngineConfig) -> Result<Arc<dyn DatabaseAdapter>> {
    config.validate()?;
    debug!("Creating {} adapter for {}", config.kind(), config.describe());
    let adapter: Arc<dyn DatabaseAdapter> = match config.kind() {
        EngineKind::Sqlite => Arc::new(SqliteAdapter::new(config.clone())),
        EngineKind::Mysql => Arc::new(MysqlAdapter::new(config.clone())),
        EngineKind::Postgres => Arc::new(PostgresAdapter::new(config.clone())),
    };
    Ok(adapter)
}

/// Create a transient adapter for server-level statements (`CREATE DATABASE`).
///
/// MySQL connects without selecting a database; PostgreSQL connects to the
/// `postgres` administrative database. SQLite has no server to administer.
pub fn admin_adapter(config: &EngineConfig) -> Result<Arc<dyn DatabaseAdapter>> {
    config.validate()?;
    let adapter: Arc<dyn DatabaseAdapter> = match config.kind() {
        EngineKind::Mysql => Arc::new(MysqlAdapter::without_database(config.clone())),
        EngineKind::Postgres => Arc::new(PostgresAdapter::admin(config)),
        EngineKind::Sqlite => {
            return Err(DbError::Config(
                "sqlite has no administrative connection; the file is created on connect".into(),
            ))
        }
    };
    Ok(adapter)
}

/// Enum-based static dispatch for dialects.
///
/// Lets consumers render SQL for an engine without constructing an adapter.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Sqlite(SqliteDialect),
    Mysql(MysqlDialect),
    Postgres(PostgresDialect),
}

macro_rules! dispatch {
    ($self:ident, $d:ident => $call:expr) => {
        match $self {
            DialectImpl::Sqlite($d) => $call,
            DialectImpl::Mysql($d) => $call,
            DialectImpl::Postgres($d) => $call,
        }
    };
}

impl DialectImpl {
    /// Create a dialect implementation from a database type string.
    ///
    /// # Errors
    ///
    /// Returns an error if the database type is not recognized.
    pub fn from_db_type(db_type: &str) -> Result<Self> {
        Ok(match db_type.parse::<EngineKind>()? {
            EngineKind::Sqlite => DialectImpl::Sqlite(SqliteDialect::new()),
            EngineKind::Mysql => DialectImpl::Mysql(MysqlDialect::new()),
            EngineKind::Postgres => DialectImpl::Postgres(PostgresDialect::new()),
        })
    }

    /// Dialect matching a configuration (charset and schema included).
    pub fn for_config(config: &EngineConfig) -> Self {
        match config.kind() {
            EngineKind::Sqlite => DialectImpl::Sqlite(SqliteDialect::new()),
            EngineKind::Mysql => DialectImpl::Mysql(MysqlDialect::with_charset(config.charset())),
            EngineKind::Postgres => {
                DialectImpl::Postgres(PostgresDialect::with_schema(config.schema()))
            }
        }
    }
}

impl Dialect for DialectImpl {
    fn kind(&self) -> EngineKind {
        dispatch!(self, d => d.kind())
    }

    fn quote_char(&self) -> char {
        dispatch!(self, d => d.quote_char())
    }

    fn quote_ident(&self, name: &str) -> String {
        dispatch!(self, d => d.quote_ident(name))
    }

    fn column_type_sql(&self, ty: &ColumnType) -> String {
        dispatch!(self, d => d.column_type_sql(ty))
    }

    fn default_sql(&self, default: &ColumnDefault) -> String {
        dispatch!(self, d => d.default_sql(default))
    }

    fn on_update_clause(&self, column: &ColumnDef) -> Option<String> {
        dispatch!(self, d => d.on_update_clause(column))
    }

    fn column_sql(&self, column: &ColumnDef) -> String {
        dispatch!(self, d => d.column_sql(column))
    }

    fn table_options(&self) -> String {
        dispatch!(self, d => d.table_options())
    }

    fn create_table_sql(&self, table: &TableDef) -> Vec<String> {
        dispatch!(self, d => d.create_table_sql(table))
    }

    fn drop_table_sql(&self, table: &str, if_exists: bool) -> String {
        dispatch!(self, d => d.drop_table_sql(table, if_exists))
    }

    fn add_column_sql(&self, table: &str, column: &ColumnDef) -> String {
        dispatch!(self, d => d.add_column_sql(table, column))
    }

    fn drop_column_sql(&self, table: &str, column: &str) -> String {
        dispatch!(self, d => d.drop_column_sql(table, column))
    }

    fn param_placeholder(&self, index: usize) -> String {
        dispatch!(self, d => d.param_placeholder(index))
    }

    fn insert_sql(&self, table: &str, columns: &[String]) -> String {
        dispatch!(self, d => d.insert_sql(table, columns))
    }

    fn list_tables_sql(&self) -> String {
        dispatch!(self, d => d.list_tables_sql())
    }

    fn table_structure_sql(&self, table: &str) -> String {
        dispatch!(self, d => d.table_structure_sql(table))
    }

    fn table_exists_sql(&self, table: &str) -> String {
        dispatch!(self, d => d.table_exists_sql(table))
    }

    fn date_diff(&self, end: &str, start: &str) -> String {
        dispatch!(self, d => d.date_diff(end, start))
    }

    fn date_format_pattern(&self, format: &str) -> String {
        dispatch!(self, d => d.date_format_pattern(format))
    }

    fn date_format(&self, expr: &str, format: &str) -> String {
        dispatch!(self, d => d.date_format(expr, format))
    }

    fn date_sub(&self, expr: &str, amount: i64, unit: DateUnit) -> String {
        dispatch!(self, d => d.date_sub(expr, amount, unit))
    }

    fn start_of_month(&self, expr: &str) -> String {
        dispatch!(self, d => d.start_of_month(expr))
    }

    fn current_date(&self) -> String {
        dispatch!(self, d => d.current_date())
    }

    fn concat(&self, parts: &[&str]) -> String {
        dispatch!(self, d => d.concat(parts))
    }
}
