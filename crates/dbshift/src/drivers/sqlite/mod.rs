//! SQLite driver.
//!
//! - [`SqliteDialect`]: SQL syntax strategy
//! - [`SqliteAdapter`]: adapter over one `sqlx::SqliteConnection`
//!
//! The `database` field of the configuration is the path of the database
//! file. Dropping columns needs SQLite 3.35.0 or newer.

mod adapter;
mod dialect;

pub use adapter::SqliteAdapter;
pub use dialect::SqliteDialect;
