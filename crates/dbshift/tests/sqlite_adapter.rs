//! Adapter contract tests against temporary SQLite files, plus dialect
//! properties that hold for every engine without a connection.

use dbshift::drivers::{MysqlAdapter, PostgresAdapter, SqliteAdapter};
use dbshift::{
    create_adapter, ColumnType, ConnectionRegistry, DatabaseAdapter, DbError, Dialect,
    DialectImpl, EngineConfig, SqlValue,
};
use tempfile::TempDir;

fn sqlite(dir: &TempDir) -> std::sync::Arc<dyn DatabaseAdapter> {
    let path = dir.path().join("app.db");
    create_adapter(&EngineConfig::sqlite(path.to_string_lossy())).unwrap()
}

fn column_names(columns: &[dbshift::ColumnInfo]) -> Vec<&str> {
    columns.iter().map(|c| c.name.as_str()).collect()
}

#[tokio::test]
async fn test_schema_round_trip() {
    let dir = TempDir::new().unwrap();
    let adapter = sqlite(&dir);

    adapter.create_table("items").await.unwrap();
    let columns = adapter.columns("items").await.unwrap();
    assert_eq!(column_names(&columns), vec!["id", "created_at", "updated_at"]);
    assert!(columns[0].is_primary_key);
    assert!(!columns[1].is_primary_key);

    adapter
        .add_column("items", "c", ColumnType::Varchar(100))
        .await
        .unwrap();
    let columns = adapter.columns("items").await.unwrap();
    assert!(column_names(&columns).contains(&"c"));
    assert!(columns.iter().find(|c| c.name == "c").unwrap().nullable);

    adapter.delete_column("items", "c").await.unwrap();
    let columns = adapter.columns("items").await.unwrap();
    assert!(!column_names(&columns).contains(&"c"));

    adapter.delete_table("items").await.unwrap();
    assert!(!adapter.table_exists("items").await.unwrap());
}

#[tokio::test]
async fn test_tables_are_sorted_and_exclude_internal() {
    let dir = TempDir::new().unwrap();
    let adapter = sqlite(&dir);
    for name in ["zeta", "alpha", "mid"] {
        adapter.create_table(name).await.unwrap();
    }
    assert_eq!(adapter.tables().await.unwrap(), vec!["alpha", "mid", "zeta"]);
}

#[tokio::test]
async fn test_schema_errors_are_typed() {
    let dir = TempDir::new().unwrap();
    let adapter = sqlite(&dir);
    adapter.create_table("items").await.unwrap();

    let err = adapter.create_table("items").await.unwrap_err();
    assert!(matches!(err, DbError::Schema { ref object, .. } if object == "items"));

    let err = adapter.delete_table("missing").await.unwrap_err();
    assert!(matches!(err, DbError::Schema { .. }));

    let err = adapter
        .add_column("items", "id2", ColumnType::Id)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Schema { .. }));
}

#[tokio::test]
async fn test_transactions_are_single_level() {
    let dir = TempDir::new().unwrap();
    let adapter = sqlite(&dir);

    assert!(matches!(adapter.commit().await, Err(DbError::Transaction(_))));
    adapter.begin_transaction().await.unwrap();
    assert!(matches!(
        adapter.begin_transaction().await,
        Err(DbError::Transaction(_))
    ));
    adapter.create_table("scratch").await.unwrap();
    adapter.rollback().await.unwrap();

    assert!(!adapter.in_transaction());
    assert!(!adapter.table_exists("scratch").await.unwrap());
}

#[tokio::test]
async fn test_failed_rollback_keeps_transaction_open() {
    let dir = TempDir::new().unwrap();
    let adapter = sqlite(&dir);

    adapter.begin_transaction().await.unwrap();
    // End the transaction underneath the adapter.
    adapter.execute("COMMIT").await.unwrap();
    assert!(matches!(
        adapter.rollback().await,
        Err(DbError::Transaction(_))
    ));
    assert!(adapter.in_transaction());

    adapter.execute("BEGIN").await.unwrap();
    adapter.rollback().await.unwrap();
    assert!(!adapter.in_transaction());
}

#[tokio::test]
async fn test_native_connection_through_registry() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig::sqlite(dir.path().join("app.db").to_string_lossy());
    let registry = ConnectionRegistry::new();
    let adapter = registry.get_or_create(&config).await.unwrap();

    assert!(adapter.downcast_ref::<MysqlAdapter>().is_none());
    assert!(adapter.downcast_ref::<PostgresAdapter>().is_none());
    let sqlite = adapter.downcast_ref::<SqliteAdapter>().unwrap();
    assert_eq!(sqlite.path(), dir.path().join("app.db"));

    let mut conn = sqlite.connection().await.unwrap();
    let answer: i64 = sqlx::query_scalar("SELECT 40 + 2")
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    assert_eq!(answer, 42);
}

#[tokio::test]
async fn test_insert_and_fetch_preserves_values() {
    let dir = TempDir::new().unwrap();
    let adapter = sqlite(&dir);
    adapter.create_table("items").await.unwrap();
    adapter
        .add_column("items", "label", ColumnType::Text)
        .await
        .unwrap();

    let columns = vec!["id".to_string(), "label".to_string()];
    adapter
        .insert_row("items", &columns, &[SqlValue::Int(7), "seven".into()])
        .await
        .unwrap();
    adapter
        .insert_row("items", &columns, &[SqlValue::Int(8), SqlValue::Null])
        .await
        .unwrap();

    let rows = adapter.fetch_all("items").await.unwrap();
    let id = rows.column_index("id").unwrap();
    let label = rows.column_index("label").unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows.rows[0][id], SqlValue::Int(7));
    assert_eq!(rows.rows[0][label], SqlValue::Text("seven".into()));
    assert_eq!(rows.rows[1][label], SqlValue::Null);
    assert_eq!(adapter.row_count("items").await.unwrap(), 2);

    let err = adapter
        .insert_row("items", &columns, &[SqlValue::Int(7), "dup".into()])
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::DataCopy { ref table, .. } if table == "items"));
}

#[tokio::test]
async fn test_size_and_maintenance() {
    let dir = TempDir::new().unwrap();
    let adapter = sqlite(&dir);
    adapter.create_table("items").await.unwrap();

    assert!(adapter.database_size().await.unwrap() > 0);
    assert!(adapter.optimize().await);
    adapter.ping().await.unwrap();
}

#[tokio::test]
async fn test_consumer_sql_helpers_run() {
    let dir = TempDir::new().unwrap();
    let adapter = sqlite(&dir);
    adapter.create_table("items").await.unwrap();

    let rows = adapter.query(&adapter.list_tables_sql()).await.unwrap();
    assert_eq!(rows.rows[0][0], SqlValue::Text("items".into()));

    let sql = format!(
        "SELECT {}, {}",
        adapter.date_format("'2024-03-15 10:20:30'", "Y-m"),
        adapter.concat(&["'a'", "'b'"])
    );
    let rows = adapter.query(&sql).await.unwrap();
    assert_eq!(rows.rows[0][0], SqlValue::Text("2024-03".into()));
    assert_eq!(rows.rows[0][1], SqlValue::Text("ab".into()));
}

#[test]
fn test_quote_doubling_per_engine() {
    let cases = [
        ("sqlite", "we\"ird", "\"we\"\"ird\""),
        ("postgres", "we\"ird", "\"we\"\"ird\""),
        ("mysql", "we`ird", "`we``ird`"),
    ];
    for (engine, name, expected) in cases {
        let dialect = DialectImpl::from_db_type(engine).unwrap();
        let quoted = dialect.quote_ident(name);
        assert_eq!(quoted, expected, "{}", engine);

        let q = dialect.quote_char();
        let inner = &quoted[1..quoted.len() - 1];
        assert_eq!(
            inner.matches(q).count(),
            2 * name.matches(q).count(),
            "{}",
            engine
        );
    }
}

#[test]
fn test_date_format_mapping_per_engine() {
    let sqlite = DialectImpl::from_db_type("sqlite").unwrap();
    let mysql = DialectImpl::from_db_type("mysql").unwrap();
    let pg = DialectImpl::from_db_type("postgres").unwrap();

    assert_eq!(sqlite.date_format_pattern("Y-m-d"), "%Y-%m-%d");
    assert_eq!(mysql.date_format_pattern("Y-m-d"), "%Y-%m-%d");
    assert_eq!(pg.date_format_pattern("Y-m-d"), "YYYY-MM-DD");

    // Unrecognised formats pass through unchanged.
    assert_eq!(pg.date_format_pattern("Q"), "Q");
}
