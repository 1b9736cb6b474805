//! Core traits of the adapter layer.
//!
//! - [`Dialect`]: SQL syntax strategy for one engine, pure and connection-free
//! - [`DatabaseAdapter`]: the contract every engine adapter satisfies
//!
//! # Design Patterns
//!
//! - **Strategy**: each engine's `Dialect` renders the same structured schema
//!   and helper calls in its own syntax
//! - **Template Method**: default `DatabaseAdapter` methods compose the
//!   engine-specific primitives (DDL execution, queries) into the higher-level
//!   schema operations

use std::any::Any;
use std::fmt;

use async_trait::async_trait;

use crate::config::{EngineConfig, EngineKind};
use crate::core::identifier::{quote_literal, quote_with, validate_identifier};
use crate::core::schema::{ColumnDef, ColumnDefault, ColumnInfo, ColumnType, TableDef};
use crate::core::value::{RowSet, SqlValue};
use crate::error::{DbError, Result};

/// Unit for date arithmetic helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateUnit {
    Day,
    Month,
    Year,
    Hour,
    Minute,
}

impl DateUnit {
    /// Singular English name, used by every dialect's interval syntax.
    pub fn as_str(&self) -> &'static str {
        match self {
            DateUnit::Day => "day",
            DateUnit::Month => "month",
            DateUnit::Year => "year",
            DateUnit::Hour => "hour",
            DateUnit::Minute => "minute",
        }
    }
}

impl fmt::Display for DateUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SQL syntax strategy for one database engine.
///
/// Everything here is pure string rendering, so it is testable without a
/// server and shared by the adapter and by consumers building their own queries.
pub trait Dialect: Send + Sync {
    /// Engine this dialect renders for.
    fn kind(&self) -> EngineKind;

    /// Identifier quote character.
    fn quote_char(&self) -> char;

    /// Quote an identifier, doubling embedded quote characters.
    fn quote_ident(&self, name: &str) -> String {
        quote_with(name, self.quote_char())
    }

    /// Render a column type.
    fn column_type_sql(&self, ty: &ColumnType) -> String;

    /// Render a default value.
    fn default_sql(&self, default: &ColumnDefault) -> String {
        match default {
            ColumnDefault::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
            ColumnDefault::Integer(v) => v.to_string(),
            ColumnDefault::Boolean(v) => if *v { "1" } else { "0" }.to_string(),
            ColumnDefault::Text(v) => quote_literal(v),
        }
    }

    /// Inline "refresh on update" clause; `None` for engines without one.
    fn on_update_clause(&self, _column: &ColumnDef) -> Option<String> {
        None
    }

    /// Render a full column definition.
    fn column_sql(&self, column: &ColumnDef) -> String {
        let mut sql = format!(
            "{} {}",
            self.quote_ident(&column.name),
            self.column_type_sql(&column.ty)
        );
        if column.ty != ColumnType::Id {
            if !column.nullable {
                sql.push_str(" NOT NULL");
            }
            if column.unique {
                sql.push_str(" UNIQUE");
            }
            if let Some(default) = &column.default {
                sql.push_str(" DEFAULT ");
                sql.push_str(&self.default_sql(default));
            }
            if column.on_update_now {
                if let Some(clause) = self.on_update_clause(column) {
                    sql.push(' ');
                    sql.push_str(&clause);
                }
            }
        }
        sql
    }

    /// Trailing table options (storage engine, charset).
    fn table_options(&self) -> String {
        String::new()
    }

    /// Statements creating a table, in execution order.
    fn create_table_sql(&self, table: &TableDef) -> Vec<String> {
        let columns: Vec<String> = table.columns.iter().map(|c| self.column_sql(c)).collect();
        vec![format!(
            "CREATE TABLE {} (\n    {}\n){}",
            self.quote_ident(&table.name),
            columns.join(",\n    "),
            self.table_options()
        )]
    }

    /// `DROP TABLE` statement.
    fn drop_table_sql(&self, table: &str, if_exists: bool) -> String {
        format!(
            "DROP TABLE {}{}",
            if if_exists { "IF EXISTS " } else { "" },
            self.quote_ident(table)
        )
    }

    /// `ALTER TABLE ... ADD COLUMN` statement.
    fn add_column_sql(&self, table: &str, column: &ColumnDef) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_ident(table),
            self.column_sql(column)
        )
    }

    /// `ALTER TABLE ... DROP COLUMN` statement.
    fn drop_column_sql(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_ident(table),
            self.quote_ident(column)
        )
    }

    /// Parameter placeholder for the given 1-based index.
    fn param_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    /// Parameterized single-row INSERT.
    fn insert_sql(&self, table: &str, columns: &[String]) -> String {
        let cols: Vec<String> = columns.iter().map(|c| self.quote_ident(c)).collect();
        let params: Vec<String> = (1..=columns.len())
            .map(|i| self.param_placeholder(i))
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote_ident(table),
            cols.join(", "),
            params.join(", ")
        )
    }

    /// Query listing user tables, one name per row, alphabetical.
    fn list_tables_sql(&self) -> String;

    /// Query describing a table's columns.
    fn table_structure_sql(&self, table: &str) -> String;

    /// Query returning a single row whose first column is non-zero when the table exists.
    fn table_exists_sql(&self, table: &str) -> String;

    /// Whole days between two date expressions (`end - start`).
    fn date_diff(&self, end: &str, start: &str) -> String;

    /// Engine format string for a recognised format token; unknown tokens are
    /// returned unchanged.
    fn date_format_pattern(&self, format: &str) -> String;

    /// Format a date expression.
    fn date_format(&self, expr: &str, format: &str) -> String;

    /// Subtract an interval from a date expression.
    fn date_sub(&self, expr: &str, amount: i64, unit: DateUnit) -> String;

    /// First day of the month of a date expression.
    fn start_of_month(&self, expr: &str) -> String;

    /// Today's date.
    fn current_date(&self) -> String;

    /// String concatenation of the given expressions.
    fn concat(&self, parts: &[&str]) -> String {
        format!("CONCAT({})", parts.join(", "))
    }
}

/// Contract every engine adapter satisfies.
///
/// An adapter owns exactly one lazily opened connection bound to one
/// [`EngineConfig`]; `connect` opens it at most once and every other method
/// reuses it. Schema mutations are committed immediately unless the caller
/// has opened a transaction. Transactions are single-level: a nested
/// `begin_transaction` fails instead of silently succeeding.
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    // ===== Identity =====

    /// Configuration this adapter is bound to.
    fn config(&self) -> &EngineConfig;

    /// SQL dialect of this engine.
    fn dialect(&self) -> &dyn Dialect;

    /// Engine identifier.
    fn engine(&self) -> EngineKind {
        self.config().kind()
    }

    /// The concrete adapter, for callers that need the engine's native
    /// connection; see `<dyn DatabaseAdapter>::downcast_ref`.
    fn as_any(&self) -> &dyn Any;

    // ===== Connection =====

    /// Open the native connection if it is not open yet.
    async fn connect(&self) -> Result<()>;

    /// Round-trip a trivial statement.
    async fn ping(&self) -> Result<()>;

    // ===== Raw statements =====

    /// Execute a statement, returning the affected row count.
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Execute a DDL statement, reporting failures as schema errors on `object`.
    async fn execute_schema(&self, object: &str, sql: &str) -> Result<()>;

    /// Run a query and collect every row.
    async fn query(&self, sql: &str) -> Result<RowSet>;

    // ===== Introspection =====

    /// User table names, alphabetical, excluding engine-internal tables.
    async fn tables(&self) -> Result<Vec<String>>;

    /// Columns of a table in declaration order.
    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Whether a table exists.
    async fn table_exists(&self, table: &str) -> Result<bool> {
        let rows = self.query(&self.dialect().table_exists_sql(table)).await?;
        Ok(rows
            .rows
            .first()
            .and_then(|r| r.first())
            .and_then(SqlValue::as_i64)
            .is_some_and(|v| v != 0))
    }

    // ===== Schema mutation =====

    /// Create a table with the standard shape: auto-increment `id`,
    /// `created_at` and `updated_at`.
    async fn create_table(&self, name: &str) -> Result<()> {
        self.create_table_def(&TableDef::standard(name)).await
    }

    /// Create a table from a structured description.
    async fn create_table_def(&self, table: &TableDef) -> Result<()> {
        validate_identifier(&table.name)?;
        for statement in self.dialect().create_table_sql(table) {
            self.execute_schema(&table.name, &statement).await?;
        }
        Ok(())
    }

    /// Drop a table; fails when it does not exist.
    async fn delete_table(&self, name: &str) -> Result<()> {
        validate_identifier(name)?;
        self.execute_schema(name, &self.dialect().drop_table_sql(name, false))
            .await
    }

    /// Drop a table if present.
    async fn drop_table_if_exists(&self, name: &str) -> Result<()> {
        validate_identifier(name)?;
        self.execute_schema(name, &self.dialect().drop_table_sql(name, true))
            .await
    }

    /// Add a nullable column.
    async fn add_column(&self, table: &str, column: &str, ty: ColumnType) -> Result<()> {
        validate_identifier(table)?;
        validate_identifier(column)?;
        if ty == ColumnType::Id {
            return Err(DbError::schema(
                format!("{}.{}", table, column),
                "an auto-increment key cannot be added to an existing table",
            ));
        }
        let def = ColumnDef::new(column, ty);
        self.execute_schema(table, &self.dialect().add_column_sql(table, &def))
            .await
    }

    /// Drop a column.
    async fn delete_column(&self, table: &str, column: &str) -> Result<()> {
        validate_identifier(table)?;
        validate_identifier(column)?;
        self.execute_schema(table, &self.dialect().drop_column_sql(table, column))
            .await
    }

    /// Quote an identifier for this engine.
    fn quote_name(&self, identifier: &str) -> String {
        self.dialect().quote_ident(identifier)
    }

    // ===== Transactions =====

    /// Start a transaction; fails if one is already open.
    async fn begin_transaction(&self) -> Result<()>;

    /// Commit the open transaction.
    async fn commit(&self) -> Result<()>;

    /// Roll back the open transaction.
    async fn rollback(&self) -> Result<()>;

    /// Whether a transaction is open.
    fn in_transaction(&self) -> bool;

    /// Whether DDL statements take part in transactions on this engine.
    fn transactional_ddl(&self) -> bool;

    // ===== Data =====

    /// Read every row of a table.
    async fn fetch_all(&self, table: &str) -> Result<RowSet> {
        validate_identifier(table)?;
        self.query(&format!("SELECT * FROM {}", self.quote_name(table)))
            .await
    }

    /// Insert one row, reporting failures as data copy errors.
    async fn insert_row(&self, table: &str, columns: &[String], values: &[SqlValue])
        -> Result<()>;

    /// Move auto-increment counters past rows inserted with explicit keys.
    ///
    /// MySQL and SQLite advance their counters on insert; engines using
    /// sequences override this.
    async fn sync_auto_increment(&self, _table: &TableDef) -> Result<()> {
        Ok(())
    }

    /// Number of rows in a table.
    async fn row_count(&self, table: &str) -> Result<i64> {
        validate_identifier(table)?;
        let rows = self
            .query(&format!("SELECT COUNT(*) FROM {}", self.quote_name(table)))
            .await?;
        rows.rows
            .first()
            .and_then(|r| r.first())
            .and_then(SqlValue::as_i64)
            .ok_or_else(|| DbError::query(format!("counting rows of {}", table), "no result"))
    }

    // ===== Maintenance =====

    /// Size of the database in bytes.
    async fn database_size(&self) -> Result<u64>;

    /// Run the engine's maintenance operation. Best effort.
    async fn optimize(&self) -> bool;

    /// Create a database on the server this adapter is connected to.
    async fn create_database(&self, name: &str) -> Result<()> {
        Err(DbError::Config(format!(
            "{} adapters cannot create database '{}'",
            self.engine(),
            name
        )))
    }

    // ===== Consumer SQL helpers =====

    fn list_tables_sql(&self) -> String {
        self.dialect().list_tables_sql()
    }

    fn table_structure_sql(&self, table: &str) -> String {
        self.dialect().table_structure_sql(table)
    }

    fn table_exists_sql(&self, table: &str) -> String {
        self.dialect().table_exists_sql(table)
    }

    fn date_diff(&self, end: &str, start: &str) -> String {
        self.dialect().date_diff(end, start)
    }

    fn date_format(&self, expr: &str, format: &str) -> String {
        self.dialect().date_format(expr, format)
    }

    fn date_sub(&self, expr: &str, amount: i64, unit: DateUnit) -> String {
        self.dialect().date_sub(expr, amount, unit)
    }

    fn start_of_month(&self, expr: &str) -> String {
        self.dialect().start_of_month(expr)
    }

    fn current_date(&self) -> String {
        self.dialect().current_date()
    }

    fn concat(&self, parts: &[&str]) -> String {
        self.dialect().concat(parts)
    }
}

impl dyn DatabaseAdapter {
    /// Borrow the concrete adapter behind a registry handle.
    ///
    /// ```rust,no_run
    /// # async fn demo(registry: &dbshift::ConnectionRegistry) -> dbshift::Result<()> {
    /// use dbshift::drivers::SqliteAdapter;
    ///
    /// let adapter = registry.system().await?;
    /// if let Some(sqlite) = adapter.downcast_ref::<SqliteAdapter>() {
    ///     let _conn = sqlite.connection().await?;
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn downcast_ref<T: DatabaseAdapter + 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_unit_names() {
        assert_eq!(DateUnit::Day.as_str(), "day");
        assert_eq!(DateUnit::Minute.to_string(), "minute");
    }
}
