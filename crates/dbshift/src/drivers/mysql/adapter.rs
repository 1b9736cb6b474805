//! MySQL/MariaDB adapter over a single sqlx connection.

use std::any::Any;

use async_trait::async_trait;
use sqlx::mysql::{
    MySql, MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlDatabaseError, MySqlRow,
};
use sqlx::query::Query;
use sqlx::{Column, Connection, Row, TypeInfo, ValueRef};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::MysqlDialect;
use crate::config::{EngineConfig, EngineKind};
use crate::core::identifier::{quote_mysql, validate_identifier};
use crate::core::schema::ColumnInfo;
use crate::core::traits::{DatabaseAdapter, Dialect};
use crate::core::value::{RowSet, SqlValue};
use crate::drivers::common::{column_infos, statement_preview, SslMode, TransactionState};
use crate::error::{DbError, Result};

/// Server error number for "Unknown database".
const ER_BAD_DB_ERROR: u16 = 1049;

/// Adapter for a MySQL/MariaDB database.
///
/// Statements with parameters always go through server-side prepared
/// statements (sqlx never emulates them client-side). The connection
/// character set is passed in the handshake and set again with `SET NAMES`
/// right after connecting.
pub struct MysqlAdapter {
    config: EngineConfig,
    dialect: MysqlDialect,
    select_database: bool,
    conn: Mutex<Option<MySqlConnection>>,
    tx: TransactionState,
}

impl MysqlAdapter {
    /// Create an adapter bound to the configured database. No connection is opened.
    pub fn new(config: EngineConfig) -> Self {
        Self::build(config, true)
    }

    /// Create an adapter that connects without selecting a database, for
    /// server-level statements such as `CREATE DATABASE`.
    pub fn without_database(config: EngineConfig) -> Self {
        Self::build(config, false)
    }

    fn build(config: EngineConfig, select_database: bool) -> Self {
        Self {
            dialect: MysqlDialect::with_charset(config.charset()),
            config,
            select_database,
            conn: Mutex::new(None),
            tx: TransactionState::new(),
        }
    }

    /// The native connection, opened on first use.
    pub async fn connection(&self) -> Result<MappedMutexGuard<'_, MySqlConnection>> {
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
        }
        MutexGuard::try_map(guard, Option::as_mut)
            .map_err(|_| DbError::connection(EngineKind::Mysql, "connection unavailable"))
    }

    async fn open(&self) -> Result<MySqlConnection> {
        let ssl_mode: SslMode = self.config.ssl_mode().parse()?;
        let charset = self.config.charset();

        let mut options = MySqlConnectOptions::new()
            .host(self.config.host())
            .port(self.config.port())
            .username(self.config.username())
            .password(self.config.password())
            .charset(charset)
            .ssl_mode(ssl_mode.mysql());
        if self.select_database {
            options = options.database(&self.config.database);
        }

        let mut conn = MySqlConnection::connect_with(&options)
            .await
            .map_err(|e| self.classify_connect_error(e))?;

        let set_names = format!("SET NAMES {}", charset);
        sqlx::Executor::execute(&mut conn, sqlx::raw_sql(&set_names))
            .await
            .map_err(|e| DbError::connection(EngineKind::Mysql, e))?;

        info!(
            "Connected to MySQL: {}:{}/{}",
            self.config.host(),
            self.config.port(),
            if self.select_database { self.config.database.as_str() } else { "" }
        );
        Ok(conn)
    }

    /// Split "unknown database" from every other connect failure.
    fn classify_connect_error(&self, err: sqlx::Error) -> DbError {
        if let sqlx::Error::Database(db_err) = &err {
            let unknown_db = db_err
                .try_downcast_ref::<MySqlDatabaseError>()
                .is_some_and(|e| e.number() == ER_BAD_DB_ERROR);
            if unknown_db && self.select_database {
                return DbError::DatabaseMissing {
                    engine: EngineKind::Mysql,
                    database: self.config.database.clone(),
                };
            }
        }
        DbError::connection(EngineKind::Mysql, err)
    }

    async fn run_raw(
        &self,
        sql: &str,
        on_error: impl FnOnce(sqlx::Error) -> DbError + Send,
    ) -> Result<u64> {
        let mut conn = self.connection().await?;
        debug!("MySQL: {}", statement_preview(sql));
        sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(sql))
            .await
            .map(|r| r.rows_affected())
            .map_err(on_error)
    }
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &SqlValue,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Decimal(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.clone()),
        SqlValue::Bytes(v) => query.bind(v.clone()),
        SqlValue::Timestamp(v) => query.bind(*v),
        SqlValue::Date(v) => query.bind(*v),
    }
}

/// Decode a column by its reported server type.
fn decode_value(row: &MySqlRow, idx: usize) -> std::result::Result<SqlValue, sqlx::Error> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(SqlValue::Null);
    }
    let type_name = row.column(idx).type_info().name().to_ascii_uppercase();
    let value = match type_name.as_str() {
        "BOOLEAN" => SqlValue::Bool(row.try_get_unchecked::<i64, _>(idx)? != 0),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            SqlValue::Int(row.try_get_unchecked::<i64, _>(idx)?)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => {
            let v = row.try_get_unchecked::<u64, _>(idx)?;
            match i64::try_from(v) {
                Ok(v) => SqlValue::Int(v),
                Err(_) => SqlValue::Decimal(v.into()),
            }
        }
        "FLOAT" => SqlValue::Float(f64::from(row.try_get_unchecked::<f32, _>(idx)?)),
        "DOUBLE" => SqlValue::Float(row.try_get_unchecked::<f64, _>(idx)?),
        "DECIMAL" => SqlValue::Decimal(row.try_get_unchecked::<rust_decimal::Decimal, _>(idx)?),
        "DATETIME" | "TIMESTAMP" => {
            SqlValue::Timestamp(row.try_get_unchecked::<chrono::NaiveDateTime, _>(idx)?)
        }
        "DATE" => SqlValue::Date(row.try_get_unchecked::<chrono::NaiveDate, _>(idx)?),
        "TIME" => SqlValue::Text(
            row.try_get_unchecked::<chrono::NaiveTime, _>(idx)?
                .to_string(),
        ),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => SqlValue::Bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
        // VARCHAR, CHAR, TEXT variants, ENUM, SET, JSON
        _ => SqlValue::Text(row.try_get_unchecked::<String, _>(idx)?),
    };
    Ok(value)
}

fn to_row_set(rows: &[MySqlRow]) -> std::result::Result<RowSet, sqlx::Error> {
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
impl DatabaseAdapter for MysqlAdapter {
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
            .map_err(|e| DbError::connection(EngineKind::Mysql, e))
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
        let rows = self.query(&self.dialect.table_structure_sql(table)).await?;
        column_infos(table, rows)
    }

    async fn begin_transaction(&self) -> Result<()> {
        self.tx.enter()?;
        if let Err(e) = self
            .run_raw("START TRANSACTION", |e| {
                DbError::Transaction(format!("START TRANSACTION failed: {}", e))
            })
            .await
        {
            self.tx.leave();
            return Err(e);
        }
        debug!("MySQL transaction started");
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.tx.require_open("commit")?;
        self.run_raw("COMMIT", |e| DbError::Transaction(format!("COMMIT failed: {}", e)))
            .await?;
        self.tx.leave();
        debug!("MySQL transaction committed");
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.tx.require_open("rollback")?;
        self.run_raw("ROLLBACK", |e| DbError::Transaction(format!("ROLLBACK failed: {}", e)))
            .await?;
        self.tx.leave();
        debug!("MySQL transaction rolled back");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.tx.is_open()
    }

    fn transactional_ddl(&self) -> bool {
        false
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
        let rows = self
            .query(
                "SELECT CAST(COALESCE(SUM(data_length + index_length), 0) AS SIGNED) \
                 FROM information_schema.TABLES WHERE TABLE_SCHEMA = DATABASE()",
            )
            .await?;
        rows.rows
            .first()
            .and_then(|r| r.first())
            .and_then(SqlValue::as_i64)
            .map(|v| v.max(0) as u64)
            .ok_or_else(|| DbError::query("reading MySQL database size", "no result"))
    }

    async fn optimize(&self) -> bool {
        let tables = match self.tables().await {
            Ok(tables) => tables,
            Err(e) => {
                warn!("MySQL optimize could not list tables: {}", e);
                return false;
            }
        };
        for table in &tables {
            let sql = format!("OPTIMIZE TABLE {}", self.dialect.quote_ident(table));
            if let Err(e) = self.run_raw(&sql, |e| DbError::query(sql.clone(), e)).await {
                warn!("OPTIMIZE TABLE {} failed: {}", table, e);
            }
        }
        info!("MySQL optimize finished for {} tables", tables.len());
        true
    }

    async fn create_database(&self, name: &str) -> Result<()> {
        let sql = format!(
            "CREATE DATABASE IF NOT EXISTS {} CHARACTER SET {}",
            quote_mysql(name)?,
            self.config.charset()
        );
        self.execute_schema(name, &sql).await?;
        info!("Created MySQL database {}", name);
        Ok(())
    }
}
