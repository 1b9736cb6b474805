//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: SQL syntax strategy
//! - [`PostgresAdapter`]: adapter over one `tokio_postgres::Client`
//!
//! Row values are coerced to the parameter types of the prepared INSERT
//! before binding (see [`coerce`]).

mod adapter;
pub mod coerce;
mod dialect;

pub use adapter::PostgresAdapter;
pub use dialect::PostgresDialect;
