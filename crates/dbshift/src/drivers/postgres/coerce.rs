//! Coercion of row values to PostgreSQL parameter types.
//!
//! tokio-postgres binds parameters strictly by type: an `i64` will not bind
//! to an `INT4` column and a string will not bind to a `TIMESTAMP`. Rows read
//! from SQLite carry integers as `i64` and dates as text, so every value is
//! converted to the type the prepared statement reports before binding.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio_postgres::types::{ToSql, Type};

use crate::core::value::SqlValue;

/// Boxed parameter ready for binding.
pub type PgParam = Box<dyn ToSql + Sync + Send>;

/// Text layouts accepted for timestamps, tried in order.
const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Convert `value` to a parameter accepted for `ty`.
///
/// NULL becomes a typed `None` of the target type. Types without a dedicated
/// conversion are bound as text.
pub fn coerce(value: &SqlValue, ty: &Type) -> Result<PgParam, String> {
    let param: PgParam = match ty.name() {
        "bool" => Box::new(to_bool(value)?),
        "int2" => Box::new(narrow::<i16>(to_int(value)?, "smallint")?),
        "int4" => Box::new(narrow::<i32>(to_int(value)?, "integer")?),
        "int8" => Box::new(to_int(value)?),
        "float4" => Box::new(to_float(value)?.map(|v| v as f32)),
        "float8" => Box::new(to_float(value)?),
        "numeric" => Box::new(to_decimal(value)?),
        "timestamp" => Box::new(to_timestamp(value)?),
        "timestamptz" => Box::new(to_timestamp(value)?.map(|t| t.and_utc())),
        "date" => Box::new(to_date(value)?),
        "bytea" => Box::new(to_bytes(value)),
        "json" | "jsonb" => Box::new(to_json(value)?),
        _ => Box::new(value.to_text()),
    };
    Ok(param)
}

fn mismatch(value: &SqlValue, target: &str) -> String {
    format!("cannot convert {:?} to {}", value, target)
}

fn narrow<T: TryFrom<i64>>(value: Option<i64>, target: &str) -> Result<Option<T>, String> {
    value
        .map(|v| T::try_from(v).map_err(|_| format!("value {} out of range for {}", v, target)))
        .transpose()
}

pub(crate) fn to_bool(value: &SqlValue) -> Result<Option<bool>, String> {
    let b = match value {
        SqlValue::Null => return Ok(None),
        SqlValue::Bool(b) => *b,
        SqlValue::Int(v) => *v != 0,
        SqlValue::Float(v) => *v != 0.0,
        SqlValue::Decimal(v) => !v.is_zero(),
        SqlValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "t" | "true" | "y" | "yes" | "on" => true,
            "0" | "f" | "false" | "n" | "no" | "off" => false,
            _ => return Err(mismatch(value, "boolean")),
        },
        _ => return Err(mismatch(value, "boolean")),
    };
    Ok(Some(b))
}

pub(crate) fn to_int(value: &SqlValue) -> Result<Option<i64>, String> {
    let v = match value {
        SqlValue::Null => return Ok(None),
        SqlValue::Int(v) => *v,
        SqlValue::Bool(b) => i64::from(*b),
        SqlValue::Float(f) => float_to_int(*f).ok_or_else(|| mismatch(value, "integer"))?,
        SqlValue::Decimal(d) if d.fract().is_zero() => {
            d.to_i64().ok_or_else(|| mismatch(value, "integer"))?
        }
        SqlValue::Text(s) => s.trim().parse().map_err(|_| mismatch(value, "integer"))?,
        _ => return Err(mismatch(value, "integer")),
    };
    Ok(Some(v))
}

/// Whole floats inside the `i64` range; fractions, NaN and infinities fail.
fn float_to_int(f: f64) -> Option<i64> {
    // i64::MAX is not representable; 2^63 is the first value out of range.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    (f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f)).then(|| f as i64)
}

pub(crate) fn to_float(value: &SqlValue) -> Result<Option<f64>, String> {
    let v = match value {
        SqlValue::Null => return Ok(None),
        SqlValue::Float(f) => *f,
        SqlValue::Int(v) => *v as f64,
        SqlValue::Bool(b) => f64::from(u8::from(*b)),
        SqlValue::Decimal(d) => d.to_f64().ok_or_else(|| mismatch(value, "double"))?,
        SqlValue::Text(s) => s.trim().parse().map_err(|_| mismatch(value, "double"))?,
        _ => return Err(mismatch(value, "double")),
    };
    Ok(Some(v))
}

pub(crate) fn to_decimal(value: &SqlValue) -> Result<Option<Decimal>, String> {
    let v = match value {
        SqlValue::Null => return Ok(None),
        SqlValue::Decimal(d) => *d,
        SqlValue::Int(v) => Decimal::from(*v),
        SqlValue::Bool(b) => Decimal::from(u8::from(*b)),
        SqlValue::Float(f) => Decimal::try_from(*f).map_err(|_| mismatch(value, "numeric"))?,
        SqlValue::Text(s) => {
            let s = s.trim();
            Decimal::from_str(s)
                .or_else(|_| Decimal::from_scientific(s))
                .map_err(|_| mismatch(value, "numeric"))?
        }
        _ => return Err(mismatch(value, "numeric")),
    };
    Ok(Some(v))
}

/// Parse the timestamp layouts SQLite and MySQL produce.
pub(crate) fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|t| t.naive_utc()))
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

pub(crate) fn to_timestamp(value: &SqlValue) -> Result<Option<NaiveDateTime>, String> {
    let v = match value {
        SqlValue::Null => return Ok(None),
        SqlValue::Timestamp(t) => *t,
        SqlValue::Date(d) => d.and_hms_opt(0, 0, 0).ok_or_else(|| mismatch(value, "timestamp"))?,
        SqlValue::Text(s) => parse_timestamp(s).ok_or_else(|| mismatch(value, "timestamp"))?,
        // Unix epoch seconds.
        SqlValue::Int(secs) => DateTime::from_timestamp(*secs, 0)
            .map(|t| t.naive_utc())
            .ok_or_else(|| mismatch(value, "timestamp"))?,
        _ => return Err(mismatch(value, "timestamp")),
    };
    Ok(Some(v))
}

pub(crate) fn to_date(value: &SqlValue) -> Result<Option<NaiveDate>, String> {
    let v = match value {
        SqlValue::Null => return Ok(None),
        SqlValue::Date(d) => *d,
        SqlValue::Timestamp(t) => t.date(),
        SqlValue::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .ok()
            .or_else(|| parse_timestamp(s).map(|t| t.date()))
            .ok_or_else(|| mismatch(value, "date"))?,
        _ => return Err(mismatch(value, "date")),
    };
    Ok(Some(v))
}

fn to_bytes(value: &SqlValue) -> Option<Vec<u8>> {
    match value {
        SqlValue::Bytes(b) => Some(b.clone()),
        other => other.to_text().map(String::into_bytes),
    }
}

pub(crate) fn to_json(value: &SqlValue) -> Result<Option<serde_json::Value>, String> {
    let v = match value {
        SqlValue::Null => return Ok(None),
        SqlValue::Text(s) => serde_json::from_str(s).map_err(|e| format!("invalid JSON: {}", e))?,
        SqlValue::Bool(b) => serde_json::Value::from(*b),
        SqlValue::Int(v) => serde_json::Value::from(*v),
        SqlValue::Float(v) => serde_json::Value::from(*v),
        other => serde_json::Value::from(other.to_text().unwrap_or_default()),
    };
    Ok(Some(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::core::{ColumnDef, ColumnType, SchemaCatalog, TableDef};
    use crate::drivers::create_adapter;

    #[test]
    fn test_integer_narrowing() {
        assert_eq!(narrow::<i32>(Some(42), "integer").unwrap(), Some(42));
        assert_eq!(narrow::<i32>(None, "integer").unwrap(), None);
        assert!(narrow::<i16>(Some(70_000), "smallint").is_err());
        assert!(coerce(&SqlValue::Int(i64::MAX), &Type::INT4).is_err());
        assert!(coerce(&SqlValue::Int(3), &Type::INT4).is_ok());
    }

    #[test]
    fn test_float_to_int_checks_range() {
        assert_eq!(to_int(&SqlValue::Float(3.0)).unwrap(), Some(3));
        assert_eq!(to_int(&SqlValue::Float(-9.007e15)).unwrap(), Some(-9_007_000_000_000_000));
        assert!(to_int(&SqlValue::Float(2.5)).is_err());
        assert!(to_int(&SqlValue::Float(1e20)).is_err());
        assert!(to_int(&SqlValue::Float(-1e20)).is_err());
        assert!(to_int(&SqlValue::Float(9_223_372_036_854_775_808.0)).is_err());
        assert!(to_int(&SqlValue::Float(f64::NAN)).is_err());
        assert!(to_int(&SqlValue::Float(f64::INFINITY)).is_err());
        assert!(coerce(&SqlValue::Float(1e20), &Type::INT8).is_err());
    }

    #[test]
    fn test_text_to_int() {
        assert_eq!(to_int(&" 12 ".into()).unwrap(), Some(12));
        assert!(to_int(&"twelve".into()).is_err());
        assert!(coerce(&"twelve".into(), &Type::INT8).is_err());
    }

    #[test]
    fn test_sqlite_booleans() {
        assert_eq!(to_bool(&SqlValue::Int(1)).unwrap(), Some(true));
        assert_eq!(to_bool(&SqlValue::Int(0)).unwrap(), Some(false));
        assert_eq!(to_bool(&"false".into()).unwrap(), Some(false));
        assert!(to_bool(&"maybe".into()).is_err());
    }

    #[test]
    fn test_timestamp_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(7, 8, 9)
            .unwrap();
        assert_eq!(parse_timestamp("2024-05-06 07:08:09"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-06T07:08:09"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-06T07:08:09Z"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-05-06"),
            NaiveDate::from_ymd_opt(2024, 5, 6).unwrap().and_hms_opt(0, 0, 0)
        );
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_dates() {
        let d = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        assert_eq!(to_date(&"2023-12-31".into()).unwrap(), Some(d));
        assert_eq!(to_date(&"2023-12-31 23:59:00".into()).unwrap(), Some(d));
    }

    #[test]
    fn test_decimals() {
        assert_eq!(
            to_decimal(&"19.99".into()).unwrap(),
            Some(Decimal::from_str("19.99").unwrap())
        );
        assert_eq!(to_decimal(&SqlValue::Int(5)).unwrap(), Some(Decimal::from(5)));
        assert!(to_decimal(&"abc".into()).is_err());
    }

    #[test]
    fn test_json() {
        let v = to_json(&"{\"a\":1}".into()).unwrap().unwrap();
        assert_eq!(v["a"], 1);
        assert!(to_json(&"{broken".into()).is_err());
    }

    #[test]
    fn test_null_is_typed() {
        for ty in [Type::BOOL, Type::INT4, Type::TIMESTAMP, Type::TEXT, Type::JSONB] {
            assert!(coerce(&SqlValue::Null, &ty).is_ok());
        }
    }

    /// PostgreSQL parameter type of each column type, as `PostgresDialect`
    /// declares it.
    fn pg_type(ty: &ColumnType) -> Type {
        match ty {
            ColumnType::Id | ColumnType::Integer => Type::INT4,
            ColumnType::BigInteger => Type::INT8,
            ColumnType::Boolean => Type::BOOL,
            ColumnType::Decimal { .. } => Type::NUMERIC,
            ColumnType::Real => Type::FLOAT8,
            ColumnType::Varchar(_) => Type::VARCHAR,
            ColumnType::Text => Type::TEXT,
            ColumnType::Timestamp => Type::TIMESTAMP,
            ColumnType::Date => Type::DATE,
            ColumnType::Json => Type::JSONB,
            ColumnType::Blob => Type::BYTEA,
        }
    }

    fn every_type() -> TableDef {
        TableDef::new("samples")
            .column(ColumnDef::new("id", ColumnType::Id))
            .column(ColumnDef::new("qty", ColumnType::Integer))
            .column(ColumnDef::new("total", ColumnType::BigInteger))
            .column(ColumnDef::new("flag", ColumnType::Boolean))
            .column(ColumnDef::new(
                "price",
                ColumnType::Decimal {
                    precision: 10,
                    scale: 2,
                },
            ))
            .column(ColumnDef::new("ratio", ColumnType::Real))
            .column(ColumnDef::new("label", ColumnType::Varchar(20)))
            .column(ColumnDef::new("body", ColumnType::Text))
            .column(ColumnDef::new("seen_at", ColumnType::Timestamp))
            .column(ColumnDef::new("born_on", ColumnType::Date))
            .column(ColumnDef::new("meta", ColumnType::Json))
            .column(ColumnDef::new("raw", ColumnType::Blob))
            .with_timestamps()
    }

    #[tokio::test]
    async fn test_sqlite_rows_coerce_for_every_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system.db");
        let sqlite = create_adapter(&EngineConfig::sqlite(path.to_string_lossy())).unwrap();

        let system = SchemaCatalog::system();
        let tables = vec![
            system.table("users").unwrap().clone(),
            system.table("audit_log").unwrap().clone(),
            every_type(),
        ];
        for table in &tables {
            sqlite.create_table_def(table).await.unwrap();
        }
        for sql in [
            "INSERT INTO users (username, email, password_hash) VALUES ('ada', 'ada@example.com', 'h')",
            "INSERT INTO users (username, email, password_hash, is_active, last_login) \
             VALUES ('grace', 'grace@example.com', 'h', 0, '2024-05-06 07:08:09')",
            r#"INSERT INTO audit_log (user_id, action, details) VALUES (1, 'login', '{"ok":true,"tries":[1,2]}')"#,
            "INSERT INTO audit_log (action) VALUES ('cleanup')",
            r#"INSERT INTO samples (qty, total, flag, price, ratio, label, body, seen_at, born_on, meta, raw)
               VALUES (7, 9000000000, 1, '19.99', 0.5, 'x', 'long text',
                       '2024-05-06 07:08:09', '2024-05-06', '{"k":[1]}', X'DEADBEEF')"#,
            "INSERT INTO samples (qty) VALUES (NULL)",
        ] {
            sqlite.execute(sql).await.unwrap();
        }

        for table in &tables {
            let rows = sqlite.fetch_all(&table.name).await.unwrap();
            assert_eq!(rows.len(), 2, "{}", table.name);
            for row in &rows.rows {
                for (name, value) in rows.columns.iter().zip(row) {
                    let column = table.find_column(name).unwrap();
                    let ty = pg_type(&column.ty);
                    assert!(
                        coerce(value, &ty).is_ok(),
                        "{}.{} = {:?} as {}",
                        table.name,
                        name,
                        value,
                        ty
                    );
                }
            }
        }

        let users = sqlite.fetch_all("users").await.unwrap();
        let active = users.column_index("is_active").unwrap();
        let created = users.column_index("created_at").unwrap();
        assert_eq!(to_bool(&users.rows[0][active]).unwrap(), Some(true));
        assert_eq!(to_bool(&users.rows[1][active]).unwrap(), Some(false));
        assert!(to_timestamp(&users.rows[0][created]).unwrap().is_some());

        let audit = sqlite.fetch_all("audit_log").await.unwrap();
        let details = audit.column_index("details").unwrap();
        let json = to_json(&audit.rows[0][details]).unwrap().unwrap();
        assert_eq!(json["tries"][1], 2);
        assert_eq!(to_json(&audit.rows[1][details]).unwrap(), None);

        let samples = sqlite.fetch_all("samples").await.unwrap();
        let row = &samples.rows[0];
        let col = |name: &str| &row[samples.column_index(name).unwrap()];
        assert_eq!(to_int(col("total")).unwrap(), Some(9_000_000_000));
        assert_eq!(
            to_decimal(col("price")).unwrap().map(|d| d.round_dp(2)),
            Some(Decimal::from_str("19.99").unwrap())
        );
        assert_eq!(
            to_date(col("born_on")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 6)
        );
        assert_eq!(to_bytes(col("raw")), Some(vec![0xDE, 0xAD, 0xBE, 0xEF]));
    }
}
