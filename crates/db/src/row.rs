//! Conversion of MySQL result rows into [`Record`]s.
//!
//! Columns are decoded by their reported type name. Keys keep the select
//! order so that a sink deriving its header from the first record gets the
//! same column order as the query.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use recon_core::types::{Record, Value};
use rust_decimal::Decimal;
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

use crate::error::DbError;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How a column's raw value is decoded, keyed off its MySQL type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColumnKind {
    Bool,
    Signed,
    Unsigned,
    Float,
    Double,
    Decimal,
    DateTime,
    Date,
    Time,
    Other,
}

impl ColumnKind {
    pub(crate) fn from_type_name(name: &str) -> Self {
        let upper = name.to_ascii_uppercase();
        let is_int = matches!(
            upper.trim_end_matches(" UNSIGNED"),
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT"
        );
        match upper.as_str() {
            "BOOLEAN" => ColumnKind::Bool,
            _ if is_int && upper.ends_with(" UNSIGNED") => ColumnKind::Unsigned,
            _ if is_int => ColumnKind::Signed,
            "FLOAT" => ColumnKind::Float,
            "DOUBLE" => ColumnKind::Double,
            "DECIMAL" => ColumnKind::Decimal,
            "DATETIME" | "TIMESTAMP" => ColumnKind::DateTime,
            "DATE" => ColumnKind::Date,
            "TIME" => ColumnKind::Time,
            _ => ColumnKind::Other,
        }
    }
}

/// Decode every column of `row` into a [`Record`].
pub fn row_to_record(row: &MySqlRow) -> Result<Record, DbError> {
    let mut record = Record::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, idx, column.name(), column.type_info().name())?;
        record.insert(column.name(), value);
    }
    Ok(record)
}

fn decode_column(row: &MySqlRow, idx: usize, column: &str, type_name: &str) -> Result<Value, DbError> {
    let raw = row.try_get_raw(idx).map_err(|e| decode_error(column, type_name, e))?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let err = |e: sqlx::Error| decode_error(column, type_name, e);
    let value = match ColumnKind::from_type_name(type_name) {
        ColumnKind::Bool => Value::Bool(row.try_get::<bool, _>(idx).map_err(err)?),
        ColumnKind::Signed => Value::Int(row.try_get::<i64, _>(idx).map_err(err)?),
        ColumnKind::Unsigned => Value::UInt(row.try_get::<u64, _>(idx).map_err(err)?),
        ColumnKind::Float => Value::Float(f64::from(row.try_get::<f32, _>(idx).map_err(err)?)),
        ColumnKind::Double => Value::Float(row.try_get::<f64, _>(idx).map_err(err)?),
        // Kept as text so the exact scale survives into the CSV.
        ColumnKind::Decimal => Value::Text(row.try_get::<Decimal, _>(idx).map_err(err)?.to_string()),
        ColumnKind::DateTime => Value::Text(
            row.try_get::<NaiveDateTime, _>(idx)
                .map_err(err)?
                .format(DATETIME_FORMAT)
                .to_string(),
        ),
        ColumnKind::Date => Value::Text(row.try_get::<NaiveDate, _>(idx).map_err(err)?.to_string()),
        ColumnKind::Time => Value::Text(row.try_get::<NaiveTime, _>(idx).map_err(err)?.to_string()),
        ColumnKind::Other => decode_textual(row, idx).ok_or_else(|| DbError::Decode {
            column: column.to_string(),
            type_name: type_name.to_string(),
            message: "unsupported column type".to_string(),
        })?,
    };
    Ok(value)
}

/// Text-ish fallback: strings, then raw bytes, then integers.
fn decode_textual(row: &MySqlRow, idx: usize) -> Option<Value> {
    if let Ok(s) = row.try_get::<String, _>(idx) {
        return Some(Value::Text(s));
    }
    if let Ok(bytes) = row.try_get::<Vec<u8>, _>(idx) {
        return Some(Value::Text(String::from_utf8_lossy(&bytes).into_owned()));
    }
    row.try_get::<i64, _>(idx).ok().map(Value::Int)
}

fn decode_error(column: &str, type_name: &str, e: sqlx::Error) -> DbError {
    DbError::Decode {
        column: column.to_string(),
        type_name: type_name.to_string(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_kinds() {
        assert_eq!(ColumnKind::from_type_name("BIGINT"), ColumnKind::Signed);
        assert_eq!(ColumnKind::from_type_name("INT UNSIGNED"), ColumnKind::Unsigned);
        assert_eq!(ColumnKind::from_type_name("tinyint"), ColumnKind::Signed);
        assert_eq!(ColumnKind::from_type_name("BOOLEAN"), ColumnKind::Bool);
    }

    #[test]
    fn temporal_and_numeric_kinds() {
        assert_eq!(ColumnKind::from_type_name("DECIMAL"), ColumnKind::Decimal);
        assert_eq!(ColumnKind::from_type_name("TIMESTAMP"), ColumnKind::DateTime);
        assert_eq!(ColumnKind::from_type_name("DATE"), ColumnKind::Date);
        assert_eq!(ColumnKind::from_type_name("DOUBLE"), ColumnKind::Double);
    }

    #[test]
    fn text_types_fall_through() {
        assert_eq!(ColumnKind::from_type_name("VARCHAR"), ColumnKind::Other);
        assert_eq!(ColumnKind::from_type_name("ENUM"), ColumnKind::Other);
        assert_eq!(ColumnKind::from_type_name("JSON"), ColumnKind::Other);
    }
}
