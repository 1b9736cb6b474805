//! MySQL/MariaDB driver.
//!
//! - [`MysqlDialect`]: SQL syntax strategy
//! - [`MysqlAdapter`]: adapter over one `sqlx::MySqlConnection`
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+
//!
//! DDL on this engine commits implicitly, so [`MysqlAdapter`] reports
//! `transactional_ddl() == false` and the migration orchestrator creates
//! tables before opening its data transaction.

mod adapter;
mod dialect;

pub use adapter::MysqlAdapter;
pub use dialect::MysqlDialect;
