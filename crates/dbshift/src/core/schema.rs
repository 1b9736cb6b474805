//! Structured, engine-neutral table descriptions.
//!
//! Tables are described as typed column lists and rendered to SQL by each
//! dialect. Nothing here produces SQL text.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DbError, Result};

/// Engine-neutral column type.
///
/// The set is closed: every dialect renders every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// Auto-incrementing integer primary key.
    Id,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInteger,
    /// Boolean flag.
    Boolean,
    /// Exact decimal.
    Decimal { precision: u8, scale: u8 },
    /// Double precision floating point.
    Real,
    /// Bounded string.
    Varchar(u32),
    /// Unbounded string.
    Text,
    /// Date and time without zone.
    Timestamp,
    /// Date only.
    Date,
    /// JSON document.
    Json,
    /// Binary data.
    Blob,
}

impl ColumnType {
    /// Whether values of this type are timestamps (eligible for `on_update_now`).
    pub fn is_temporal(&self) -> bool {
        matches!(self, ColumnType::Timestamp)
    }
}

impl FromStr for ColumnType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase();
        let (base, args) = match normalized.split_once('(') {
            Some((base, rest)) => (base.trim(), Some(rest.trim_end_matches(')').trim())),
            None => (normalized.as_str(), None),
        };

        let numbers: Vec<u32> = args
            .map(|a| a.split(',').filter_map(|n| n.trim().parse().ok()).collect())
            .unwrap_or_default();

        let ty = match base {
            "id" | "serial" | "bigserial" => ColumnType::Id,
            "tinyint" if numbers.first() == Some(&1) => ColumnType::Boolean,
            "int" | "integer" | "int4" | "smallint" | "int2" | "mediumint" | "tinyint" => {
                ColumnType::Integer
            }
            "bigint" | "int8" => ColumnType::BigInteger,
            "bool" | "boolean" => ColumnType::Boolean,
            "decimal" | "numeric" => {
                let precision = numbers.first().copied().unwrap_or(10).min(65) as u8;
                let scale = numbers.get(1).copied().unwrap_or(2).min(precision as u32) as u8;
                ColumnType::Decimal { precision, scale }
            }
            "real" | "float" | "double" | "double precision" | "float4" | "float8" => {
                ColumnType::Real
            }
            "varchar" | "character varying" | "char" | "character" | "nvarchar" => {
                ColumnType::Varchar(numbers.first().copied().unwrap_or(255))
            }
            "text" | "tinytext" | "mediumtext" | "longtext" | "clob" => ColumnType::Text,
            "timestamp" | "datetime" | "timestamptz" | "timestamp without time zone" => {
                ColumnType::Timestamp
            }
            "date" => ColumnType::Date,
            "json" | "jsonb" => ColumnType::Json,
            "blob" | "bytea" | "binary" | "varbinary" | "longblob" | "mediumblob" => {
                ColumnType::Blob
            }
            _ => {
                return Err(DbError::schema(
                    s,
                    "unsupported column type; expected one of id, integer, bigint, boolean, \
                     decimal(p,s), real, varchar(n), text, timestamp, date, json, blob",
                ))
            }
        };
        Ok(ty)
    }
}

/// Default value of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnDefault {
    /// The current timestamp at insert time.
    CurrentTimestamp,
    /// Integer literal.
    Integer(i64),
    /// Boolean literal.
    Boolean(bool),
    /// String literal.
    Text(String),
}

/// Column description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
    pub nullable: bool,
    pub unique: bool,
    pub default: Option<ColumnDefault>,
    /// Refresh to the current time whenever the row is updated.
    pub on_update_now: bool,
}

impl ColumnDef {
    /// Nullable column without default.
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            nullable: ty != ColumnType::Id,
            ty,
            unique: false,
            default: None,
            on_update_now: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }

    pub fn on_update_now(mut self) -> Self {
        self.on_update_now = true;
        self
    }
}

/// Table description: a name and ordered columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    /// Empty table description.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// The shape produced by `create_table`: an auto-increment key and two
    /// timestamps, the second refreshed on update.
    pub fn standard(name: impl Into<String>) -> Self {
        Self::new(name)
            .column(ColumnDef::new("id", ColumnType::Id))
            .with_timestamps()
    }

    /// Append a column.
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Append `created_at` and `updated_at`.
    pub fn with_timestamps(self) -> Self {
        self.column(
            ColumnDef::new("created_at", ColumnType::Timestamp)
                .default_value(ColumnDefault::CurrentTimestamp),
        )
        .column(
            ColumnDef::new("updated_at", ColumnType::Timestamp)
                .default_value(ColumnDefault::CurrentTimestamp)
                .on_update_now(),
        )
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Look up a column by name.
    pub fn find_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns refreshed on update.
    pub fn on_update_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.on_update_now)
    }
}

/// Column as reported by schema introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Engine-native type name.
    pub data_type: String,
    pub nullable: bool,
    /// Engine-native default expression.
    pub default: Option<String>,
    pub is_primary_key: bool,
}

impl fmt::Display for ColumnInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.data_type)?;
        if !self.nullable {
            f.write_str(" NOT NULL")?;
        }
        if self.is_primary_key {
            f.write_str(" PRIMARY KEY")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_column_types() {
        assert_eq!("INTEGER".parse::<ColumnType>().unwrap(), ColumnType::Integer);
        assert_eq!("bigint".parse::<ColumnType>().unwrap(), ColumnType::BigInteger);
        assert_eq!("tinyint(1)".parse::<ColumnType>().unwrap(), ColumnType::Boolean);
        assert_eq!("tinyint(4)".parse::<ColumnType>().unwrap(), ColumnType::Integer);
        assert_eq!("VARCHAR(64)".parse::<ColumnType>().unwrap(), ColumnType::Varchar(64));
        assert_eq!("varchar".parse::<ColumnType>().unwrap(), ColumnType::Varchar(255));
        assert_eq!(
            "decimal(12, 4)".parse::<ColumnType>().unwrap(),
            ColumnType::Decimal { precision: 12, scale: 4 }
        );
        assert_eq!("datetime".parse::<ColumnType>().unwrap(), ColumnType::Timestamp);
        assert_eq!("jsonb".parse::<ColumnType>().unwrap(), ColumnType::Json);
        assert_eq!("bytea".parse::<ColumnType>().unwrap(), ColumnType::Blob);
    }

    #[test]
    fn test_parse_unknown_type_is_schema_error() {
        let err = "geometry".parse::<ColumnType>().unwrap_err();
        assert!(matches!(err, DbError::Schema { .. }));
    }

    #[test]
    fn test_standard_table_shape() {
        let table = TableDef::standard("projects");
        assert_eq!(table.column_names(), vec!["id", "created_at", "updated_at"]);
        assert!(!table.columns[0].nullable);

        let on_update: Vec<_> = table.on_update_columns().map(|c| c.name.as_str()).collect();
        assert_eq!(on_update, vec!["updated_at"]);
    }

    #[test]
    fn test_column_builder() {
        let col = ColumnDef::new("email", ColumnType::Varchar(190))
            .not_null()
            .unique();
        assert!(!col.nullable);
        assert!(col.unique);
        assert!(col.default.is_none());
    }
}
