//! Schema catalog: the ordered set of tables owned by the system database.
//!
//! The [`SchemaCatalog`] is an explicitly constructed registry of
//! [`TableDef`]s, shared by first-run installation and migration. Order is
//! significant: tables are created (and copied) in catalog order, so parents
//! come before the tables that reference them.

use crate::core::schema::{ColumnDef, ColumnDefault, ColumnType, TableDef};
use crate::error::{DbError, Result};

/// Ordered registry of table descriptions.
///
/// # Example
///
/// ```rust
/// use dbshift::core::{ColumnDef, ColumnType, SchemaCatalog, TableDef};
///
/// let mut catalog = SchemaCatalog::new();
/// catalog
///     .register(TableDef::standard("notes").column(ColumnDef::new("body", ColumnType::Text)))
///     .unwrap();
/// assert_eq!(catalog.table_names(), vec!["notes"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaCatalog {
    tables: Vec<TableDef>,
}

impl SchemaCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in system tables, parents first.
    pub fn system() -> Self {
        let tables = vec![
            TableDef::new("roles")
                .column(ColumnDef::new("id", ColumnType::Id))
                .column(ColumnDef::new("name", ColumnType::Varchar(64)).not_null().unique())
                .column(ColumnDef::new("description", ColumnType::Text))
                .with_timestamps(),
            TableDef::new("users")
                .column(ColumnDef::new("id", ColumnType::Id))
                .column(ColumnDef::new("username", ColumnType::Varchar(64)).not_null().unique())
                .column(ColumnDef::new("email", ColumnType::Varchar(190)).not_null().unique())
                .column(ColumnDef::new("password_hash", ColumnType::Varchar(255)).not_null())
                .column(
                    ColumnDef::new("is_active", ColumnType::Boolean)
                        .not_null()
                        .default_value(ColumnDefault::Boolean(true)),
                )
                .column(ColumnDef::new("last_login", ColumnType::Timestamp))
                .with_timestamps(),
            TableDef::new("user_roles")
                .column(ColumnDef::new("id", ColumnType::Id))
                .column(ColumnDef::new("user_id", ColumnType::Integer).not_null())
                .column(ColumnDef::new("role_id", ColumnType::Integer).not_null())
                .column(created_at()),
            TableDef::new("settings")
                .column(ColumnDef::new("id", ColumnType::Id))
                .column(ColumnDef::new("name", ColumnType::Varchar(128)).not_null().unique())
                .column(ColumnDef::new("value", ColumnType::Text))
                .with_timestamps(),
            TableDef::new("sessions")
                .column(ColumnDef::new("id", ColumnType::Id))
                .column(ColumnDef::new("user_id", ColumnType::Integer).not_null())
                .column(ColumnDef::new("token", ColumnType::Varchar(128)).not_null().unique())
                .column(ColumnDef::new("ip_address", ColumnType::Varchar(45)))
                .column(ColumnDef::new("user_agent", ColumnType::Text))
                .column(ColumnDef::new("expires_at", ColumnType::Timestamp))
                .column(created_at()),
            TableDef::new("api_keys")
                .column(ColumnDef::new("id", ColumnType::Id))
                .column(ColumnDef::new("user_id", ColumnType::Integer).not_null())
                .column(ColumnDef::new("name", ColumnType::Varchar(100)).not_null())
                .column(ColumnDef::new("key_hash", ColumnType::Varchar(255)).not_null().unique())
                .column(ColumnDef::new("last_used_at", ColumnType::Timestamp))
                .column(ColumnDef::new("expires_at", ColumnType::Timestamp))
                .with_timestamps(),
            TableDef::new("webhooks")
                .column(ColumnDef::new("id", ColumnType::Id))
                .column(ColumnDef::new("url", ColumnType::Varchar(500)).not_null())
                .column(ColumnDef::new("event", ColumnType::Varchar(100)).not_null())
                .column(ColumnDef::new("secret", ColumnType::Varchar(255)))
                .column(
                    ColumnDef::new("is_active", ColumnType::Boolean)
                        .not_null()
                        .default_value(ColumnDefault::Boolean(true)),
                )
                .with_timestamps(),
            TableDef::new("audit_log")
                .column(ColumnDef::new("id", ColumnType::Id))
                .column(ColumnDef::new("user_id", ColumnType::Integer))
                .column(ColumnDef::new("action", ColumnType::Varchar(100)).not_null())
                .column(ColumnDef::new("entity", ColumnType::Varchar(100)))
                .column(ColumnDef::new("entity_id", ColumnType::Integer))
                .column(ColumnDef::new("details", ColumnType::Json))
                .column(ColumnDef::new("ip_address", ColumnType::Varchar(45)))
                .column(created_at()),
        ];
        Self { tables }
    }

    /// Append a table; names must be unique.
    pub fn register(&mut self, table: TableDef) -> Result<()> {
        if self.table(&table.name).is_some() {
            return Err(DbError::Config(format!(
                "Table '{}' is already registered in the schema catalog",
                table.name
            )));
        }
        self.tables.push(table);
        Ok(())
    }

    /// Builder form of [`register`](Self::register) that replaces a table of
    /// the same name in place.
    pub fn with_table(mut self, table: TableDef) -> Self {
        match self.tables.iter_mut().find(|t| t.name == table.name) {
            Some(existing) => *existing = table,
            None => self.tables.push(table),
        }
        self
    }

    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Tables in catalog order.
    pub fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    /// Table names in catalog order.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

fn created_at() -> ColumnDef {
    ColumnDef::new("created_at", ColumnType::Timestamp)
        .default_value(ColumnDefault::CurrentTimestamp)
}
