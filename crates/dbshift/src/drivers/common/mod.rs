//! Utilities shared by more than one driver.
//!
//! - [`tls`]: `ssl_mode` parsing and the PostgreSQL rustls connector
//! - [`transaction`]: single-level transaction bookkeeping

pub mod tls;
pub mod transaction;

pub use tls::{SslMode, TlsBuilder};
pub use transaction::TransactionState;

use crate::core::schema::ColumnInfo;
use crate::core::value::RowSet;
use crate::error::{DbError, Result};

/// Maximum characters of a statement quoted in error context.
const STATEMENT_PREVIEW_LEN: usize = 80;

/// One-line, truncated form of a statement for error messages and logs.
pub fn statement_preview(sql: &str) -> String {
    let flat: String = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > STATEMENT_PREVIEW_LEN {
        let cut: String = flat.chars().take(STATEMENT_PREVIEW_LEN).collect();
        format!("{}...", cut)
    } else {
        flat
    }
}

/// Build column descriptions from an introspection result laid out as
/// `name, type, nullable, default, is_primary_key`.
pub fn column_infos(table: &str, rows: RowSet) -> Result<Vec<ColumnInfo>> {
    if rows.is_empty() {
        return Err(DbError::schema(table, "table does not exist"));
    }
    rows.rows
        .into_iter()
        .map(|row| match row.as_slice() {
            [name, data_type, nullable, default, pk] => Ok(ColumnInfo {
                name: name.to_text().unwrap_or_default(),
                data_type: data_type.to_text().unwrap_or_default(),
                nullable: nullable.as_i64().unwrap_or(1) != 0,
                default: default.to_text(),
                is_primary_key: pk.as_i64().unwrap_or(0) != 0,
            }),
            other => Err(DbError::query(
                format!("describing {}", table),
                format!("expected 5 columns, got {}", other.len()),
            )),
        })
        .collect()
}
