//! PostgreSQL adapter over a single tokio-postgres client.

use std::collections::HashMap;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Config as PgConfig, NoTls, Row, Statement};
use tracing::{debug, info, warn};

use super::coerce::{coerce, PgParam};
use super::PostgresDialect;
use crate::config::{EngineConfig, EngineKind};
use crate::core::identifier::{quote_double, quote_literal, quote_pg, validate_identifier};
use crate::core::schema::{ColumnInfo, ColumnType, TableDef};
use crate::core::traits::{DatabaseAdapter, Dialect};
use crate::core::value::{RowSet, SqlValue};
use crate::drivers::common::{column_infos, statement_preview, TlsBuilder, TransactionState};
use crate::error::{DbError, Result};

/// Database every PostgreSQL server has, used for server-level statements.
pub const ADMIN_DATABASE: &str = "postgres";

/// Connect timeout for the initial handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Adapter for a PostgreSQL database.
///
/// The connection task is spawned on the tokio runtime and lives as long
/// as the client; a client whose connection has closed is replaced on next
/// use. INSERT statements are prepared once per table and column list and
/// cached until the next DDL statement or reconnect.
pub struct PostgresAdapter {
    config: EngineConfig,
    dialect: PostgresDialect,
    client: Mutex<Option<Arc<Client>>>,
    statements: Mutex<HashMap<String, Statement>>,
    tx: TransactionState,
}

impl PostgresAdapter {
    /// Create an adapter. No connection is opened.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            dialect: PostgresDialect::with_schema(config.schema()),
            config,
            client: Mutex::new(None),
            statements: Mutex::new(HashMap::new()),
            tx: TransactionState::new(),
        }
    }

    /// Adapter on the same server connected to the administrative database.
    pub fn admin(config: &EngineConfig) -> Self {
        Self::new(config.with_database(ADMIN_DATABASE))
    }

    /// The native client, connected on first use and again after the
    /// connection has closed.
    ///
    /// A connection lost inside a transaction is reported as a transaction
    /// error rather than silently replaced: the server has already rolled
    /// that transaction back.
    pub async fn client(&self) -> Result<Arc<Client>> {
        let mut slot = self.client.lock().await;
        if let Some(client) = slot.as_ref() {
            if !client.is_closed() {
                return Ok(Arc::clone(client));
            }
            *slot = None;
            self.statements.lock().await.clear();
            if self.tx.is_open() {
                self.tx.leave();
                return Err(DbError::Transaction(
                    "PostgreSQL connection closed inside a transaction".into(),
                ));
            }
            warn!(
                "PostgreSQL connection to {} closed; reconnecting",
                self.config.describe()
            );
        }
        let client = Arc::new(self.open().await?);
        *slot = Some(Arc::clone(&client));
        Ok(client)
    }

    async fn open(&self) -> Result<Client> {
        let mut pg_config = PgConfig::new();
        pg_config.host(self.config.host());
        pg_config.port(self.config.port());
        pg_config.dbname(&self.config.database);
        pg_config.user(self.config.username());
        pg_config.password(self.config.password());
        pg_config.application_name("dbshift");
        pg_config.connect_timeout(CONNECT_TIMEOUT);
        pg_config.options(&format!("-c client_encoding={}", self.config.charset()));

        let tls = TlsBuilder::new(self.config.ssl_mode().parse()?);
        let client = match tls.postgres_connector()? {
            Some(tls) => {
                let (client, connection) = pg_config
                    .connect(tls)
                    .await
                    .map_err(|e| self.classify_connect_error(e))?;
                spawn_connection(connection);
                client
            }
            None => {
                let (client, connection) = pg_config
                    .connect(NoTls)
                    .await
                    .map_err(|e| self.classify_connect_error(e))?;
                spawn_connection(connection);
                client
            }
        };

        client
            .batch_execute(&format!(
                "SET search_path TO {}",
                quote_double(self.config.schema())
            ))
            .await
            .map_err(|e| DbError::connection(EngineKind::Postgres, e))?;

        info!(
            "Connected to PostgreSQL: {}:{}/{}",
            self.config.host(),
            self.config.port(),
            self.config.database
        );
        Ok(client)
    }

    /// Split "database does not exist" from every other connect failure.
    fn classify_connect_error(&self, err: tokio_postgres::Error) -> DbError {
        if err.code() == Some(&SqlState::INVALID_CATALOG_NAME) {
            return DbError::DatabaseMissing {
                engine: EngineKind::Postgres,
                database: self.config.database.clone(),
            };
        }
        DbError::connection(EngineKind::Postgres, err)
    }

    async fn batch(
        &self,
        sql: &str,
        on_error: impl FnOnce(tokio_postgres::Error) -> DbError + Send,
    ) -> Result<()> {
        let client = self.client().await?;
        debug!("PostgreSQL: {}", statement_preview(sql));
        client.batch_execute(sql).await.map_err(on_error)
    }

    async fn insert_statement(
        &self,
        client: &Client,
        table: &str,
        columns: &[String],
    ) -> Result<Statement> {
        let sql = self.dialect.insert_sql(table, columns);
        let mut cache = self.statements.lock().await;
        if let Some(stmt) = cache.get(&sql) {
            return Ok(stmt.clone());
        }
        let stmt = client
            .prepare(&sql)
            .await
            .map_err(|e| DbError::data_copy(table, e))?;
        cache.insert(sql, stmt.clone());
        Ok(stmt)
    }
}

fn spawn_connection<C>(connection: C)
where
    C: Future<Output = std::result::Result<(), tokio_postgres::Error>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            warn!("PostgreSQL connection closed with error: {}", e);
        }
    });
}

/// Decode a column by its PostgreSQL type name.
fn decode_value(row: &Row, idx: usize) -> std::result::Result<SqlValue, tokio_postgres::Error> {
    let ty = row.columns()[idx].type_().clone();
    let value = match ty.name() {
        "bool" => row.try_get::<_, Option<bool>>(idx)?.map(SqlValue::Bool),
        "int2" => row
            .try_get::<_, Option<i16>>(idx)?
            .map(|v| SqlValue::Int(v.into())),
        "int4" => row
            .try_get::<_, Option<i32>>(idx)?
            .map(|v| SqlValue::Int(v.into())),
        "int8" => row.try_get::<_, Option<i64>>(idx)?.map(SqlValue::Int),
        "oid" => row
            .try_get::<_, Option<u32>>(idx)?
            .map(|v| SqlValue::Int(v.into())),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| SqlValue::Float(v.into())),
        "float8" => row.try_get::<_, Option<f64>>(idx)?.map(SqlValue::Float),
        "numeric" => row
            .try_get::<_, Option<rust_decimal::Decimal>>(idx)?
            .map(SqlValue::Decimal),
        "timestamp" => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)?
            .map(SqlValue::Timestamp),
        "timestamptz" => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)?
            .map(|t| SqlValue::Timestamp(t.naive_utc())),
        "date" => row
            .try_get::<_, Option<chrono::NaiveDate>>(idx)?
            .map(SqlValue::Date),
        "bytea" => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(SqlValue::Bytes),
        "json" | "jsonb" => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map(|v| SqlValue::Text(v.to_string())),
        _ => row.try_get::<_, Option<String>>(idx)?.map(SqlValue::Text),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

#[async_trait]
impl DatabaseAdapter for PostgresAdapter {
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
        self.client().await.map(|_| ())
    }

    async fn ping(&self) -> Result<()> {
        self.batch("SELECT 1", |e| DbError::connection(EngineKind::Postgres, e))
            .await
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        let client = self.client().await?;
        debug!("PostgreSQL: {}", statement_preview(sql));
        client
            .execute(sql, &[])
            .await
            .map_err(|e| DbError::query(statement_preview(sql), e))
    }

    async fn execute_schema(&self, object: &str, sql: &str) -> Result<()> {
        // Cached INSERT plans may reference the table being changed.
        self.statements.lock().await.clear();
        self.batch(sql, |e| DbError::schema(object, e)).await
    }

    async fn query(&self, sql: &str) -> Result<RowSet> {
        let client = self.client().await?;
        let context = || statement_preview(sql);
        let stmt = client
            .prepare(sql)
            .await
            .map_err(|e| DbError::query(context(), e))?;
        let columns = stmt.columns().iter().map(|c| c.name().to_string()).collect();
        let rows = client
            .query(&stmt, &[])
            .await
            .map_err(|e| DbError::query(context(), e))?;
        let rows = rows
            .iter()
            .map(|row| {
                (0..row.len())
                    .map(|i| decode_value(row, i))
                    .collect::<std::result::Result<Vec<SqlValue>, _>>()
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| DbError::query(context(), e))?;
        Ok(RowSet { columns, rows })
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
            .batch("BEGIN", |e| DbError::Transaction(format!("BEGIN failed: {}", e)))
            .await
        {
            self.tx.leave();
            return Err(e);
        }
        debug!("PostgreSQL transaction started");
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.tx.require_open("commit")?;
        let result = self
            .batch("COMMIT", |e| DbError::Transaction(format!("COMMIT failed: {}", e)))
            .await;
        // A failed COMMIT ends the transaction on this engine.
        self.tx.leave();
        result?;
        debug!("PostgreSQL transaction committed");
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.tx.require_open("rollback")?;
        let result = self
            .batch("ROLLBACK", |e| DbError::Transaction(format!("ROLLBACK failed: {}", e)))
            .await;
        // ROLLBACK only fails when the session is gone, which aborts the
        // transaction server-side.
        self.tx.leave();
        result?;
        debug!("PostgreSQL transaction rolled back");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.tx.is_open()
    }

    fn transactional_ddl(&self) -> bool {
        true
    }

    async fn insert_row(&self, table: &str, columns: &[String], values: &[SqlValue]) -> Result<()> {
        let client = self.client().await?;
        let stmt = self.insert_statement(&client, table, columns).await?;
        if values.len() != stmt.params().len() {
            return Err(DbError::data_copy(
                table,
                format!(
                    "expected {} values, got {}",
                    stmt.params().len(),
                    values.len()
                ),
            ));
        }
        let params: Vec<PgParam> = values
            .iter()
            .zip(stmt.params())
            .enumerate()
            .map(|(i, (value, ty))| {
                coerce(value, ty).map_err(|e| {
                    let column = columns.get(i).map(String::as_str).unwrap_or("?");
                    DbError::data_copy(table, format!("column {}: {}", column, e))
                })
            })
            .collect::<Result<_>>()?;
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        client
            .execute(&stmt, &refs)
            .await
            .map(|_| ())
            .map_err(|e| DbError::data_copy(table, e))
    }

    async fn sync_auto_increment(&self, table: &TableDef) -> Result<()> {
        let quoted_table = quote_pg(&table.name)?;
        for column in table.columns.iter().filter(|c| c.ty == ColumnType::Id) {
            let sql = format!(
                "SELECT setval(pg_get_serial_sequence({}, {}), COALESCE(MAX({}), 0) + 1, false) FROM {}",
                quote_literal(&quoted_table),
                quote_literal(&column.name),
                quote_pg(&column.name)?,
                quoted_table
            );
            self.query(&sql).await?;
            debug!("Advanced sequence of {}.{}", table.name, column.name);
        }
        Ok(())
    }

    async fn database_size(&self) -> Result<u64> {
        let rows = self
            .query("SELECT pg_database_size(current_database())")
            .await?;
        rows.rows
            .first()
            .and_then(|r| r.first())
            .and_then(SqlValue::as_i64)
            .map(|v| v.max(0) as u64)
            .ok_or_else(|| DbError::query("reading PostgreSQL database size", "no result"))
    }

    async fn optimize(&self) -> bool {
        if self.in_transaction() {
            warn!("PostgreSQL VACUUM skipped: a transaction is open");
            return false;
        }
        match self
            .batch("VACUUM ANALYZE", |e| DbError::query("VACUUM ANALYZE", e))
            .await
        {
            Ok(()) => {
                info!("PostgreSQL VACUUM ANALYZE completed");
                true
            }
            Err(e) => {
                warn!("PostgreSQL VACUUM ANALYZE failed: {}", e);
                false
            }
        }
    }

    async fn create_database(&self, name: &str) -> Result<()> {
        let quoted = quote_pg(name)?;
        let client = self.client().await?;
        let existing = client
            .query_opt("SELECT 1 FROM pg_database WHERE datname = $1", &[&name])
            .await
            .map_err(|e| DbError::query("looking up pg_database", e))?;
        if existing.is_some() {
            info!("PostgreSQL database {} already exists", name);
            return Ok(());
        }
        self.execute_schema(name, &format!("CREATE DATABASE {}", quoted))
            .await?;
        info!("Created PostgreSQL database {}", name);
        Ok(())
    }
}
