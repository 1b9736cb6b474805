//! SQLite SQL dialect (Strategy pattern).

use crate::config::EngineKind;
use crate::core::identifier::quote_literal;
use crate::core::schema::ColumnType;
use crate::core::traits::{DateUnit, Dialect};

/// SQLite dialect implementation.
///
/// SQLite has no inline "on update" clause, so `on_update_now` columns are
/// rendered as plain timestamps and refreshed by the application.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Create a new SQLite dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for SqliteDialect {
    fn kind(&self) -> EngineKind {
        EngineKind::Sqlite
    }

    fn quote_char(&self) -> char {
        '"'
    }

    fn column_type_sql(&self, ty: &ColumnType) -> String {
        match ty {
            ColumnType::Id => "INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::BigInteger => "BIGINT".to_string(),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Decimal { precision, scale } => format!("DECIMAL({},{})", precision, scale),
            ColumnType::Real => "REAL".to_string(),
            ColumnType::Varchar(len) => format!("VARCHAR({})", len),
            ColumnType::Text | ColumnType::Json => "TEXT".to_string(),
            ColumnType::Timestamp => "DATETIME".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Blob => "BLOB".to_string(),
        }
    }

    fn list_tables_sql(&self) -> String {
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
         ORDER BY name"
            .to_string()
    }

    fn table_structure_sql(&self, table: &str) -> String {
        format!("PRAGMA table_info({})", self.quote_ident(table))
    }

    fn table_exists_sql(&self, table: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = {}",
            quote_literal(table)
        )
    }

    fn date_diff(&self, end: &str, start: &str) -> String {
        format!("CAST(julianday({}) - julianday({}) AS INTEGER)", end, start)
    }

    fn date_format_pattern(&self, format: &str) -> String {
        match format {
            "Y-m-d" => "%Y-%m-%d",
            "Y-m" => "%Y-%m",
            "Y" => "%Y",
            "m" => "%m",
            "d" => "%d",
            "H:i" => "%H:%M",
            "Y-m-d H:i:s" => "%Y-%m-%d %H:%M:%S",
            "Y-m-d H:i" => "%Y-%m-%d %H:%M",
            other => other,
        }
        .to_string()
    }

    fn date_format(&self, expr: &str, format: &str) -> String {
        format!(
            "strftime({}, {})",
            quote_literal(&self.date_format_pattern(format)),
            expr
        )
    }

    fn date_sub(&self, expr: &str, amount: i64, unit: DateUnit) -> String {
        format!("datetime({}, '-{} {}s')", expr, amount, unit)
    }

    fn start_of_month(&self, expr: &str) -> String {
        format!("date({}, 'start of month')", expr)
    }

    fn current_date(&self) -> String {
        "date('now')".to_string()
    }

    fn concat(&self, parts: &[&str]) -> String {
        parts.join(" || ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::TableDef;

    #[test]
    fn test_quote_ident() {
        let d = SqliteDialect::new();
        assert_eq!(d.quote_ident("users"), "\"users\"");
        assert_eq!(d.quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_standard_table_has_no_on_update_clause() {
        let d = SqliteDialect::new();
        let stmts = d.create_table_sql(&TableDef::standard("projects"));
        assert_eq!(stmts.len(), 1);
        let sql = &stmts[0];
        assert!(sql.starts_with("CREATE TABLE \"projects\""));
        assert!(sql.contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("\"updated_at\" DATETIME DEFAULT CURRENT_TIMESTAMP"));
        assert!(!sql.contains("ON UPDATE"));
    }

    #[test]
    fn test_date_format_y_m_d() {
        let d = SqliteDialect::new();
        assert_eq!(d.date_format("created_at", "Y-m-d"), "strftime('%Y-%m-%d', created_at)");
        assert_eq!(d.date_format_pattern("H:i"), "%H:%M");
        assert_eq!(d.date_format_pattern("Q"), "Q");
    }

    #[test]
    fn test_date_helpers() {
        let d = SqliteDialect::new();
        assert_eq!(d.date_sub("now", 7, DateUnit::Day), "datetime(now, '-7 days')");
        assert_eq!(d.start_of_month("x"), "date(x, 'start of month')");
        assert_eq!(d.current_date(), "date('now')");
        assert_eq!(d.concat(&["a", "' '", "b"]), "a || ' ' || b");
        assert_eq!(
            d.date_diff("end_at", "start_at"),
            "CAST(julianday(end_at) - julianday(start_at) AS INTEGER)"
        );
    }

    #[test]
    fn test_introspection_sql() {
        let d = SqliteDialect::new();
        assert!(d.list_tables_sql().contains("NOT LIKE 'sqlite_%'"));
        assert_eq!(d.table_structure_sql("users"), "PRAGMA table_info(\"users\")");
        assert!(d.table_exists_sql("o'brien").ends_with("name = 'o''brien'"));
    }

    #[test]
    fn test_insert_placeholders() {
        let d = SqliteDialect::new();
        let sql = d.insert_sql("roles", &["id".into(), "name".into()]);
        assert_eq!(sql, "INSERT INTO \"roles\" (\"id\", \"name\") VALUES (?, ?)");
    }
}
