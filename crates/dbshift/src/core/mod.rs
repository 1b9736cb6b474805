//! Core abstractions shared by every engine.
//!
//! - [`schema`]: structured table and column descriptions
//! - [`value`]: row values moved between engines
//! - [`traits`]: the `Dialect` strategy and the `DatabaseAdapter` contract
//! - [`catalog`]: ordered registry of the system tables
//! - [`identifier`]: identifier validation and quoting
//!
//! Engine-specific code lives in `drivers/`; nothing here opens a connection.

pub mod catalog;
pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

// Re-export commonly used types for convenience
pub use catalog::SchemaCatalog;
pub use schema::{ColumnDef, ColumnDefault, ColumnInfo, ColumnType, TableDef};
pub use traits::{DatabaseAdapter, DateUnit, Dialect};
pub use value::{RowSet, SqlValue};
