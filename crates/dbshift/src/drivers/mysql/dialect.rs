//! MySQL/MariaDB SQL dialect (Strategy pattern).

use crate::config::{EngineKind, DEFAULT_MYSQL_CHARSET};
use crate::core::identifier::quote_literal;
use crate::core::schema::{ColumnDef, ColumnType};
use crate::core::traits::{DateUnit, Dialect};

/// MySQL/MariaDB dialect implementation.
///
/// Compatible with MySQL 5.7+, 8.0+, and MariaDB 10.2+. Introspection is
/// scoped to the connection's current database (`DATABASE()`).
#[derive(Debug, Clone)]
pub struct MysqlDialect {
    charset: String,
}

impl MysqlDialect {
    /// Create a new MySQL dialect instance using the default charset.
    pub fn new() -> Self {
        Self::with_charset(DEFAULT_MYSQL_CHARSET)
    }

    /// Dialect whose tables default to the given charset.
    pub fn with_charset(charset: impl Into<String>) -> Self {
        Self {
            charset: charset.into(),
        }
    }
}

impl Default for MysqlDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for MysqlDialect {
    fn kind(&self) -> EngineKind {
        EngineKind::Mysql
    }

    fn quote_char(&self) -> char {
        '`'
    }

    fn column_type_sql(&self, ty: &ColumnType) -> String {
        match ty {
            ColumnType::Id => "INT AUTO_INCREMENT PRIMARY KEY".to_string(),
            ColumnType::Integer => "INT".to_string(),
            ColumnType::BigInteger => "BIGINT".to_string(),
            ColumnType::Boolean => "TINYINT(1)".to_string(),
            ColumnType::Decimal { precision, scale } => format!("DECIMAL({},{})", precision, scale),
            ColumnType::Real => "DOUBLE".to_string(),
            ColumnType::Varchar(len) => format!("VARCHAR({})", len),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Timestamp => "DATETIME".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Json => "JSON".to_string(),
            ColumnType::Blob => "LONGBLOB".to_string(),
        }
    }

    fn on_update_clause(&self, column: &ColumnDef) -> Option<String> {
        column
            .ty
            .is_temporal()
            .then(|| "ON UPDATE CURRENT_TIMESTAMP".to_string())
    }

    fn table_options(&self) -> String {
        format!(" ENGINE=InnoDB DEFAULT CHARSET={}", self.charset)
    }

    fn list_tables_sql(&self) -> String {
        // information_schema columns come back as binary strings on some
        // servers; CAST keeps them decodable as text.
        "SELECT CAST(TABLE_NAME AS CHAR(255)) AS table_name \
         FROM information_schema.TABLES \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' \
         ORDER BY TABLE_NAME"
            .to_string()
    }

    fn table_structure_sql(&self, table: &str) -> String {
        format!(
            "SELECT CAST(COLUMN_NAME AS CHAR(255)) AS name, \
             CAST(COLUMN_TYPE AS CHAR(255)) AS type, \
             IF(IS_NULLABLE = 'YES', 1, 0) AS nullable, \
             CAST(COLUMN_DEFAULT AS CHAR(255)) AS dflt, \
             IF(COLUMN_KEY = 'PRI', 1, 0) AS pk \
             FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = {} \
             ORDER BY ORDINAL_POSITION",
            quote_literal(table)
        )
    }

    fn table_exists_sql(&self, table: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = {}",
            quote_literal(table)
        )
    }

    fn date_diff(&self, end: &str, start: &str) -> String {
        format!("DATEDIFF({}, {})", end, start)
    }

    fn date_format_pattern(&self, format: &str) -> String {
        match format {
            "Y-m-d" => "%Y-%m-%d",
            "Y-m" => "%Y-%m",
            "Y" => "%Y",
            "m" => "%m",
            "d" => "%d",
            "H:i" => "%H:%i",
            "Y-m-d H:i:s" => "%Y-%m-%d %H:%i:%s",
            "Y-m-d H:i" => "%Y-%m-%d %H:%i",
            other => other,
        }
        .to_string()
    }

    fn date_format(&self, expr: &str, format: &str) -> String {
        format!(
            "DATE_FORMAT({}, {})",
            expr,
            quote_literal(&self.date_format_pattern(format))
        )
    }

    fn date_sub(&self, expr: &str, amount: i64, unit: DateUnit) -> String {
        format!(
            "DATE_SUB({}, INTERVAL {} {})",
            expr,
            amount,
            unit.as_str().to_uppercase()
        )
    }

    fn start_of_month(&self, expr: &str) -> String {
        format!("DATE_FORMAT({}, '%Y-%m-01')", expr)
    }

    fn current_date(&self) -> String {
        "CURDATE()".to_string()
    }
}
