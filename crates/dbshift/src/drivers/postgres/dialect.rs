//! PostgreSQL SQL dialect (Strategy pattern).

use crate::config::{EngineKind, DEFAULT_POSTGRES_SCHEMA};
use crate::core::identifier::quote_literal;
use crate::core::schema::{ColumnDefault, ColumnType, TableDef};
use crate::core::traits::{DateUnit, Dialect};

/// PostgreSQL dialect implementation.
///
/// PostgreSQL has no inline "on update" column clause. Columns flagged
/// `on_update_now` get a shared trigger function plus a per-table
/// `BEFORE UPDATE` trigger, emitted alongside the `CREATE TABLE`.
#[derive(Debug, Clone)]
pub struct PostgresDialect {
    schema: String,
}

impl PostgresDialect {
    /// Create a new PostgreSQL dialect for the `public` schema.
    pub fn new() -> Self {
        Self::with_schema(DEFAULT_POSTGRES_SCHEMA)
    }

    /// Dialect whose introspection queries target the given schema.
    pub fn with_schema(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
        }
    }

    /// Schema searched by the introspection queries.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Name of the trigger function refreshing `column`.
    pub fn trigger_function_name(column: &str) -> String {
        format!("update_{}_column", column)
    }

    fn trigger_statements(&self, table: &TableDef) -> Vec<String> {
        let mut statements = Vec::new();
        for column in table.on_update_columns() {
            let function = self.quote_ident(&Self::trigger_function_name(&column.name));
            statements.push(format!(
                "CREATE OR REPLACE FUNCTION {}() RETURNS TRIGGER AS $$\n\
                 BEGIN\n    NEW.{} = CURRENT_TIMESTAMP;\n    RETURN NEW;\nEND;\n\
                 $$ LANGUAGE plpgsql",
                function,
                self.quote_ident(&column.name)
            ));
            statements.push(format!(
                "CREATE TRIGGER {} BEFORE UPDATE ON {} FOR EACH ROW EXECUTE PROCEDURE {}()",
                self.quote_ident(&format!("update_{}_{}", table.name, column.name)),
                self.quote_ident(&table.name),
                function
            ));
        }
        statements
    }
}

impl Default for PostgresDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for PostgresDialect {
    fn kind(&self) -> EngineKind {
        EngineKind::Postgres
    }

    fn quote_char(&self) -> char {
        '"'
    }

    fn column_type_sql(&self, ty: &ColumnType) -> String {
        match ty {
            ColumnType::Id => "SERIAL PRIMARY KEY".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::BigInteger => "BIGINT".to_string(),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Decimal { precision, scale } => format!("NUMERIC({},{})", precision, scale),
            ColumnType::Real => "DOUBLE PRECISION".to_string(),
            ColumnType::Varchar(len) => format!("VARCHAR({})", len),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Timestamp => "TIMESTAMP".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Json => "JSONB".to_string(),
            ColumnType::Blob => "BYTEA".to_string(),
        }
    }

    fn default_sql(&self, default: &ColumnDefault) -> String {
        match default {
            ColumnDefault::Boolean(v) => if *v { "TRUE" } else { "FALSE" }.to_string(),
            ColumnDefault::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
            ColumnDefault::Integer(v) => v.to_string(),
            ColumnDefault::Text(v) => quote_literal(v),
        }
    }

    fn create_table_sql(&self, table: &TableDef) -> Vec<String> {
        let columns: Vec<String> = table.columns.iter().map(|c| self.column_sql(c)).collect();
        let mut statements = vec![format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.quote_ident(&table.name),
            columns.join(",\n    ")
        )];
        statements.extend(self.trigger_statements(table));
        statements
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn list_tables_sql(&self) -> String {
        format!(
            "SELECT table_name::text FROM information_schema.tables \
             WHERE table_schema = {} AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
            quote_literal(&self.schema)
        )
    }

    fn table_structure_sql(&self, table: &str) -> String {
        let schema = quote_literal(&self.schema);
        let table = quote_literal(table);
        format!(
            "SELECT c.column_name::text AS name, c.data_type::text AS type, \
             (c.is_nullable = 'YES') AS nullable, c.column_default::text AS dflt, \
             (pk.column_name IS NOT NULL) AS pk \
             FROM information_schema.columns c \
             LEFT JOIN ( \
                 SELECT kcu.column_name \
                 FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage kcu \
                   ON tc.constraint_name = kcu.constraint_name \
                  AND tc.table_schema = kcu.table_schema \
                  AND tc.table_name = kcu.table_name \
                 WHERE tc.constraint_type = 'PRIMARY KEY' \
                   AND tc.table_schema = {schema} AND tc.table_name = {table} \
             ) pk ON pk.column_name = c.column_name \
             WHERE c.table_schema = {schema} AND c.table_name = {table} \
             ORDER BY c.ordinal_position",
            schema = schema,
            table = table
        )
    }

    fn table_exists_sql(&self, table: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = {} AND table_name = {}",
            quote_literal(&self.schema),
            quote_literal(table)
        )
    }

    fn date_diff(&self, end: &str, start: &str) -> String {
        format!("(CAST({} AS DATE) - CAST({} AS DATE))", end, start)
    }

    fn date_format_pattern(&self, format: &str) -> String {
        match format {
            "Y-m-d" => "YYYY-MM-DD",
            "Y-m" => "YYYY-MM",
            "Y" => "YYYY",
            "m" => "MM",
            "d" => "DD",
            "H:i" => "HH24:MI",
            "Y-m-d H:i:s" => "YYYY-MM-DD HH24:MI:SS",
            "Y-m-d H:i" => "YYYY-MM-DD HH24:MI",
            other => other,
        }
        .to_string()
    }

    fn date_format(&self, expr: &str, format: &str) -> String {
        format!(
            "TO_CHAR({}, {})",
            expr,
            quote_literal(&self.date_format_pattern(format))
        )
    }

    fn date_sub(&self, expr: &str, amount: i64, unit: DateUnit) -> String {
        format!("({} - INTERVAL '{} {}s')", expr, amount, unit)
    }

    fn start_of_month(&self, expr: &str) -> String {
        format!("DATE_TRUNC('month', {})", expr)
    }

    fn current_date(&self) -> String {
        "CURRENT_DATE".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::ColumnDef;

    #[test]
    fn test_quote_ident() {
        let d = PostgresDialect::new();
        assert_eq!(d.quote_ident("users"), "\"users\"");
        assert_eq!(d.quote_ident("table\"name"), "\"table\"\"name\"");
    }

    #[test]
    fn test_param_placeholder() {
        let d = PostgresDialect::new();
        assert_eq!(d.param_placeholder(1), "$1");
        assert_eq!(
            d.insert_sql("roles", &["id".into(), "name".into()]),
            "INSERT INTO \"roles\" (\"id\", \"name\") VALUES ($1, $2)"
        );
    }

    #[test]
    fn test_standard_table_installs_trigger() {
        let d = PostgresDialect::new();
        let stmts = d.create_table_sql(&TableDef::standard("projects"));
        assert_eq!(stmts.len(), 3);
        assert!(stmts[0].contains("\"id\" SERIAL PRIMARY KEY"));
        assert!(stmts[0].contains("\"updated_at\" TIMESTAMP DEFAULT CURRENT_TIMESTAMP"));
        assert!(!stmts[0].contains("ON UPDATE"));
        assert!(stmts[1].starts_with("CREATE OR REPLACE FUNCTION \"update_updated_at_column\"()"));
        assert!(stmts[1].contains("NEW.\"updated_at\" = CURRENT_TIMESTAMP"));
        assert_eq!(
            stmts[2],
            "CREATE TRIGGER \"update_projects_updated_at\" BEFORE UPDATE ON \"projects\" \
             FOR EACH ROW EXECUTE PROCEDURE \"update_updated_at_column\"()"
        );
    }

    #[test]
    fn test_table_without_on_update_has_no_trigger() {
        let d = PostgresDialect::new();
        let table = TableDef::new("tags")
            .column(ColumnDef::new("id", ColumnType::Id))
            .column(ColumnDef::new("label", ColumnType::Varchar(40)).not_null());
        assert_eq!(d.create_table_sql(&table).len(), 1);
    }

    #[test]
    fn test_boolean_default() {
        let d = PostgresDialect::new();
        let col = ColumnDef::new("active", ColumnType::Boolean)
            .not_null()
            .default_value(ColumnDefault::Boolean(true));
        assert_eq!(d.column_sql(&col), "\"active\" BOOLEAN NOT NULL DEFAULT TRUE");
    }

    #[test]
    fn test_date_format_y_m_d() {
        let d = PostgresDialect::new();
        assert_eq!(d.date_format("created_at", "Y-m-d"), "TO_CHAR(created_at, 'YYYY-MM-DD')");
        assert_eq!(d.date_format_pattern("W"), "W");
    }

    #[test]
    fn test_date_helpers() {
        let d = PostgresDialect::new();
        assert_eq!(d.date_sub("NOW()", 2, DateUnit::Month), "(NOW() - INTERVAL '2 months')");
        assert_eq!(d.date_diff("a", "b"), "(CAST(a AS DATE) - CAST(b AS DATE))");
        assert_eq!(d.start_of_month("x"), "DATE_TRUNC('month', x)");
        assert_eq!(d.current_date(), "CURRENT_DATE");
    }

    #[test]
    fn test_introspection_uses_schema() {
        let d = PostgresDialect::with_schema("app");
        assert!(d.list_tables_sql().contains("table_schema = 'app'"));
        let structure = d.table_structure_sql("users");
        assert!(structure.contains("constraint_type = 'PRIMARY KEY'"));
        assert!(structure.contains("c.table_name = 'users'"));
    }
}
