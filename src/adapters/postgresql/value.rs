//! Conversion between PostgreSQL column types and [`Value`]

use crate::domain::{Fields, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::Row;

/// Boxed statement parameter
pub type SqlParam = Box<dyn ToSql + Sync + Send>;

/// Read every supported column of a row
///
/// Columns of types Shroud does not model (arrays, numeric, bytea, ...) are
/// left out of the record and therefore read as null.
///
/// # Errors
///
/// Returns `(column, message)` when a supported column cannot be decoded.
pub fn row_to_fields(row: &Row) -> Result<Fields, (String, String)> {
    let mut fields = Fields::new();
    for (index, column) in row.columns().iter().enumerate() {
        let decoded = decode(row, index, column.type_())
            .map_err(|e| (column.name().to_string(), e.to_string()))?;
        match decoded {
            Some(value) => {
                fields.insert(column.name().to_string(), value);
            }
            None => tracing::trace!(
                column = column.name(),
                column_type = %column.type_(),
                "Skipping unsupported column type"
            ),
        }
    }
    Ok(fields)
}

fn decode(row: &Row, index: usize, ty: &Type) -> Result<Option<Value>, tokio_postgres::Error> {
    let value: Value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(index)?.into(),
        Type::INT2 => row.try_get::<_, Option<i16>>(index)?.map(i64::from).into(),
        Type::INT4 => row.try_get::<_, Option<i32>>(index)?.map(i64::from).into(),
        Type::INT8 => row.try_get::<_, Option<i64>>(index)?.into(),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(index)?.map(f64::from).into(),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(index)?.into(),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            row.try_get::<_, Option<String>>(index)?.into()
        }
        Type::UUID => row
            .try_get::<_, Option<uuid::Uuid>>(index)?
            .map(|id| id.to_string())
            .into(),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(index)?
            .map(|json| json.to_string())
            .into(),
        Type::DATE => row.try_get::<_, Option<NaiveDate>>(index)?.into(),
        Type::TIMESTAMP => row.try_get::<_, Option<NaiveDateTime>>(index)?.into(),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(index)?
            .map(|dt| dt.naive_utc())
            .into(),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// Convert a value into a parameter of the type the statement expects
///
/// # Errors
///
/// Returns a message when the value cannot be represented in `ty`.
pub fn to_sql(value: &Value, ty: &Type) -> Result<SqlParam, String> {
    let param: SqlParam = match *ty {
        Type::BOOL => Box::new(nullable(value, |v| match v {
            Value::Bool(b) => Some(*b),
            other => other.as_i64().map(|i| i != 0),
        })?),
        Type::INT2 => Box::new(nullable(value, |v| {
            v.as_i64().and_then(|i| i16::try_from(i).ok())
        })?),
        Type::INT4 => Box::new(nullable(value, |v| {
            v.as_i64().and_then(|i| i32::try_from(i).ok())
        })?),
        Type::INT8 => Box::new(nullable(value, Value::as_i64)?),
        Type::FLOAT4 => Box::new(nullable(value, |v| v.as_f64().map(|f| f as f32))?),
        Type::FLOAT8 => Box::new(nullable(value, Value::as_f64)?),
        Type::UUID => Box::new(nullable(value, |v| {
            v.as_str().and_then(|s| uuid::Uuid::parse_str(s).ok())
        })?),
        Type::JSON | Type::JSONB => Box::new(nullable(value, |v| match v {
            Value::Text(s) => serde_json::from_str::<serde_json::Value>(s).ok(),
            other => Some(other.to_json()),
        })?),
        Type::DATE => Box::new(nullable(value, |v| match v {
            Value::Date(d) => Some(*d),
            Value::DateTime(dt) => Some(dt.date()),
            Value::Text(s) => NaiveDate::parse_from_str(s, crate::domain::value::DATE_FORMAT).ok(),
            _ => None,
        })?),
        Type::TIMESTAMP => Box::new(nullable(value, to_datetime)?),
        Type::TIMESTAMPTZ => Box::new(nullable(value, |v| to_datetime(v).map(|dt| dt.and_utc()))?),
        _ => Box::new(value.to_text()),
    };
    Ok(param)
}

fn to_datetime(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::DateTime(dt) => Some(*dt),
        Value::Date(d) => d.and_hms_opt(0, 0, 0),
        Value::Text(s) => {
            NaiveDateTime::parse_from_str(s, crate::domain::value::DATETIME_FORMAT).ok()
        }
        _ => None,
    }
}

/// Null stays null; anything else must convert
fn nullable<T>(value: &Value, convert: impl Fn(&Value) -> Option<T>) -> Result<Option<T>, String> {
    if value.is_null() {
        return Ok(None);
    }
    convert(value)
        .map(Some)
        .ok_or_else(|| format!("cannot convert '{}' to the column type", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_converts_for_every_type() {
        for ty in [Type::BOOL, Type::INT4, Type::TEXT, Type::UUID, Type::DATE, Type::JSONB] {
            assert!(to_sql(&Value::Null, &ty).is_ok());
        }
    }

    #[test]
    fn test_out_of_range_integer_is_rejected() {
        assert!(to_sql(&Value::Int(40_000), &Type::INT2).is_err());
        assert!(to_sql(&Value::Int(40_000), &Type::INT4).is_ok());
    }

    #[test]
    fn test_text_conversions() {
        assert!(to_sql(&Value::from("2024-02-29"), &Type::DATE).is_ok());
        assert!(to_sql(&Value::from("not a date"), &Type::DATE).is_err());
        assert!(to_sql(&Value::from("{\"a\":1}"), &Type::JSONB).is_ok());
        assert!(to_sql(&Value::from("not-a-uuid"), &Type::UUID).is_err());
    }
}
