//! SQLite adapter over a single sqlx connection.

use std::any::Any;
use std::path::Path;

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, Connection, Row, TypeInfo, ValueRef};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::SqliteDialect;
use crate::config::{EngineConfig, EngineKind};
use crate::core::identifier::validate_identifier;
use crate::core::schema::ColumnInfo;
use crate::core::traits::{DatabaseAdapter, Dialect};
use crate::core::value::{RowSet, SqlValue};
use crate::drivers::common::{statement_preview, TransactionState};
use crate::error::{DbError, Result};

/// First SQLite release with `ALTER TABLE ... DROP COLUMN`.
const DROP_COLUMN_MIN_VERSION: (u32, u32) = (3, 35);

/// Adapter for a SQLite database file.
///
/// The file and its parent directory are created on first connect, and
/// foreign-key enforcement is switched on for the connection.
pub struct SqliteAdapter {
    config: EngineConfig,
    dialect: SqliteDialect,
    conn: Mutex<Option<SqliteConnection>>,
    tx: TransactionState,
}

impl SqliteAdapter {
    /// Create an adapter. No connection is opened.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            dialect: SqliteDialect::new(),
            conn: Mutex::new(None),
            tx: TransactionState::new(),
        }
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        Path::new(&self.config.database)
    }

    /// The native connection, opened on first use.
    pub async fn connection(&self) -> Result<MappedMutexGuard<'_, SqliteConnection>> {
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
        }
        MutexGuard::try_map(guard, Option::as_mut)
            .map_err(|_| DbError::connection(EngineKind::Sqlite, "connection unavailable"))
    }

    async fn open(&self) -> Result<SqliteConnection> {
        let path = self.path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DbError::connection(
                    EngineKind::Sqlite,
                    format!("cannot create directory {:?}: {}", parent, e),
                )
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        let mut conn = SqliteConnection::connect_with(&options)
            .await
            .map_err(|e| DbError::connection(EngineKind::Sqlite, e))?;

        sqlx::Executor::execute(&mut conn, sqlx::raw_sql("PRAGMA foreign_keys = ON"))
            .await
            .map_err(|e| DbError::connection(EngineKind::Sqlite, e))?;

        info!("Connected to SQLite database {:?}", path);
        Ok(conn)
    }

    async fn run_raw(
        &self,
        sql: &str,
        on_error: impl FnOnce(sqlx::Error) -> DbError + Send,
    ) -> Result<u64> {
        let mut conn = self.connection().await?;
        debug!("SQLite: {}", statement_preview(sql));
        sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(sql))
            .await
            .map(|r| r.rows_affected())
            .map_err(on_error)
    }

    /// Library version reported by `sqlite_version()`.
    pub async fn sqlite_version(&self) -> Result<String> {
        let rows = self.query("SELECT sqlite_version()").await?;
        rows.rows
            .first()
            .and_then(|r| r.first())
            .and_then(SqlValue::to_text)
            .ok_or_else(|| DbError::query("reading sqlite_version()", "no result"))
    }
}

/// Whether a `major.minor.patch` version supports `DROP COLUMN`.
fn supports_drop_column(version: &str) -> bool {
    let mut parts = version.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    (major, minor) >= DROP_COLUMN_MIN_VERSION
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &SqlValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        // SQLite has no exact decimal type; text keeps every digit.
        SqlValue::Decimal(v) => query.bind(v.to_string()),
        SqlValue::Text(v) => query.bind(v.clone()),
        SqlValue::Bytes(v) => query.bind(v.clone()),
        SqlValue::Timestamp(v) => query.bind(*v),
        SqlValue::Date(v) => query.bind(*v),
    }
}

/// Decode a column by the value's storage class.
fn decode_value(row: &SqliteRow, idx: usize) -> std::result::Result<SqlValue, sqlx::Error> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();
    let value = match type_name.as_str() {
        "INTEGER" | "INT" | "INT8" | "BIGINT" | "BOOLEAN" => {
            SqlValue::Int(row.try_get_unchecked::<i64, _>(idx)?)
        }
        "REAL" | "FLOAT" | "DOUBLE" => SqlValue::Float(row.try_get_unchecked::<f64, _>(idx)?),
        "BLOB" => SqlValue::Bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
        _ => SqlValue::Text(row.try_get_unchecked::<String, _>(idx)?),
    };
    Ok(value)
}

fn to_row_set(rows: &[SqliteRow]) -> std::result::Result<RowSet, sqlx::Error> {
    let columns = rows
        .first()
        .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();
    let rows = rows
        .iter()
        .map(|row| {
            (0..row.len())
                .map(|i| decode_value(row, i))
                .collect::<std::result::Result<Vec<SqlValue>, _>>()
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(RowSet { columns, rows })
}

#[async_trait]
impl DatabaseAdapter for SqliteAdapter {
    fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn connect(&self) -> Result<()> {
        self.connection().await.map(|_| ())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.ping()
            .await
            .map_err(|e| DbError::connection(EngineKind::Sqlite, e))
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        self.run_raw(sql, |e| DbError::query(statement_preview(sql), e))
            .await
    }

    async fn execute_schema(&self, object: &str, sql: &str) -> Result<()> {
        self.run_raw(sql, |e| DbError::schema(object, e))
            .await
            .map(|_| ())
    }

    async fn query(&self, sql: &str) -> Result<RowSet> {
        let mut conn = self.connection().await?;
        let rows = sqlx::Executor::fetch_all(&mut *conn, sqlx::query(sql))
            .await
            .map_err(|e| DbError::query(statement_preview(sql), e))?;
        to_row_set(&rows).map_err(|e| DbError::query(statement_preview(sql), e))
    }

    async fn tables(&self) -> Result<Vec<String>> {
        let rows = self.query(&self.dialect.list_tables_sql()).await?;
        Ok(rows
            .rows
            .iter()
            .filter_map(|r| r.first().and_then(SqlValue::to_text))
            .collect())
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        validate_identifier(table)?;
        // PRAGMA table_info: cid, name, type, notnull, dflt_value, pk
        let rows = self.query(&self.dialect.table_structure_sql(table)).await?;
        if rows.is_empty() {
            return Err(DbError::schema(table, "table does not exist"));
        }
        rows.rows
            .iter()
            .map(|r| match r.as_slice() {
                [_, name, ty, notnull, default, pk] => Ok(ColumnInfo {
                    name: name.to_text().unwrap_or_default(),
                    data_type: ty.to_text().unwrap_or_default(),
                    nullable: notnull.as_i64() == Some(0),
                    default: default.to_text(),
                    is_primary_key: pk.as_i64().unwrap_or(0) > 0,
                }),
                other => Err(DbError::query(
                    format!("describing {}", table),
                    format!("expected 6 columns, got {}", other.len()),
                )),
            })
            .collect()
    }

    async fn delete_column(&self, table: &str, column: &str) -> Result<()> {
        validate_identifier(table)?;
        validate_identifier(column)?;
        let version = self.sqlite_version().await?;
        if !supports_drop_column(&version) {
            return Err(DbError::schema(
                format!("{}.{}", table, column),
                format!(
                    "SQLite {} cannot drop columns; {}.{}.0 or newer is required",
                    version, DROP_COLUMN_MIN_VERSION.0, DROP_COLUMN_MIN_VERSION.1
                ),
            ));
        }
        self.execute_schema(table, &self.dialect.drop_column_sql(table, column))
            .await
    }

    async fn begin_transaction(&self) -> Result<()> {
        self.tx.enter()?;
        if let Err(e) = self
            .run_raw("BEGIN", |e| DbError::Transaction(format!("BEGIN failed: {}", e)))
            .await
        {
            self.tx.leave();
            return Err(e);
        }
        debug!("SQLite transaction started");
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.tx.require_open("commit")?;
        self.run_raw("COMMIT", |e| DbError::Transaction(format!("COMMIT failed: {}", e)))
            .await?;
        self.tx.leave();
        debug!("SQLite transaction committed");
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.tx.require_open("rollback")?;
        self.run_raw("ROLLBACK", |e| DbError::Transaction(format!("ROLLBACK failed: {}", e)))
            .await?;
        self.tx.leave();
        debug!("SQLite transaction rolled back");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.tx.is_open()
    }

    fn transactional_ddl(&self) -> bool {
        true
    }

    async fn insert_row(&self, table: &str, columns: &[String], values: &[SqlValue]) -> Result<()> {
        let sql = self.dialect.insert_sql(table, columns);
        let mut query = sqlx::query(&sql);
        for value in values {
            query = bind_value(query, value);
        }
        let mut conn = self.connection().await?;
        sqlx::Executor::execute(&mut *conn, query)
            .await
            .map(|_| ())
            .map_err(|e| DbError::data_copy(table, e))
    }

    async fn database_size(&self) -> Result<u64> {
        let metadata = tokio::fs::metadata(self.path())
            .await
            .map_err(|e| DbError::query(format!("reading size of {:?}", self.path()), e))?;
        Ok(metadata.len())
    }

    async fn optimize(&self) -> bool {
        if self.in_transaction() {
            warn!("SQLite VACUUM skipped: a transaction is open");
            return false;
        }
        match self.run_raw("VACUUM", |e| DbError::query("VACUUM", e)).await {
            Ok(_) => {
                info!("SQLite VACUUM completed for {:?}", self.path());
                true
            }
            Err(e) => {
                warn!("SQLite VACUUM failed: {}", e);
                false
            }
        }
    }
}
