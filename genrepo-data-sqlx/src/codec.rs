//! Value conversion between JSON-serialized records and SQLite.

use genrepo_data::{Column, ColumnKind, DataError, Entity};
use serde_json::{Map, Value};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::Row;

use crate::error::SqlxErrorExt;

/// A bind parameter in the storage class SQLite will see.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Param {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
    Bool(bool),
    Blob(Vec<u8>),
}

impl Param {
    /// Untyped conversion used for filter and raw-SQL parameters.
    pub(crate) fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Param::Null,
            Value::Bool(b) => Param::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Param::Int(i),
                None => Param::Real(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Param::Text(s.clone()),
            other => Param::Text(other.to_string()),
        }
    }

    /// Conversion guided by the declared column kind.
    pub(crate) fn for_column(kind: ColumnKind, value: Option<&Value>) -> Self {
        match (kind, value) {
            (_, None | Some(Value::Null)) => Param::Null,
            (ColumnKind::Json, Some(v)) => Param::Text(v.to_string()),
            (ColumnKind::Blob, Some(Value::Array(items))) => {
                let bytes: Option<Vec<u8>> = items
                    .iter()
                    .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                    .collect();
                match bytes {
                    Some(bytes) => Param::Blob(bytes),
                    None => Param::Text(Value::Array(items.clone()).to_string()),
                }
            }
            (ColumnKind::Real, Some(Value::Number(n))) => Param::Real(n.as_f64().unwrap_or(f64::NAN)),
            (_, Some(v)) => Param::from_value(v),
        }
    }

    fn bind<'q>(self, query: Query<'q, Sqlite, SqliteArguments<'q>>) -> Query<'q, Sqlite, SqliteArguments<'q>> {
        match self {
            Param::Null => query.bind(None::<String>),
            Param::Int(i) => query.bind(i),
            Param::Real(x) => query.bind(x),
            Param::Text(s) => query.bind(s),
            Param::Bool(b) => query.bind(b),
            Param::Blob(bytes) => query.bind(bytes),
        }
    }
}

pub(crate) fn params(values: &[Value]) -> Vec<Param> {
    values.iter().map(Param::from_value).collect()
}

pub(crate) fn bind_all(sql: &str, params: Vec<Param>) -> Query<'_, Sqlite, SqliteArguments<'_>> {
    params
        .into_iter()
        .fold(sqlx::query(sql), |query, param| param.bind(query))
}

pub(crate) fn column_names<T: Entity>() -> Vec<&'static str> {
    T::columns().iter().map(|c| c.name).collect()
}

/// Rebuild a record from a row holding every declared column.
pub(crate) fn decode_row<T: Entity>(row: &SqliteRow) -> Result<T, DataError> {
    let mut fields = Map::new();
    for column in T::columns() {
        fields.insert(column.name.to_string(), read_column(row, column)?);
    }
    Ok(serde_json::from_value(Value::Object(fields))?)
}

fn read_column(row: &SqliteRow, column: &Column) -> Result<Value, DataError> {
    let name = column.name;
    let value = match column.kind {
        ColumnKind::Integer => row
            .try_get_unchecked::<Option<i64>, _>(name)
            .map(|v| v.map(Value::from)),
        ColumnKind::Real => row
            .try_get_unchecked::<Option<f64>, _>(name)
            .map(|v| v.map(Value::from)),
        ColumnKind::Text => row
            .try_get_unchecked::<Option<String>, _>(name)
            .map(|v| v.map(Value::from)),
        ColumnKind::Boolean => row
            .try_get_unchecked::<Option<bool>, _>(name)
            .map(|v| v.map(Value::from)),
        ColumnKind::Blob => row
            .try_get_unchecked::<Option<Vec<u8>>, _>(name)
            .map(|v| v.map(Value::from)),
        ColumnKind::Json => {
            let raw = row
                .try_get_unchecked::<Option<String>, _>(name)
                .map_err(SqlxErrorExt::into_data_error)?;
            return match raw {
                Some(text) => Ok(serde_json::from_str(&text)?),
                None => Ok(Value::Null),
            };
        }
    };
    Ok(value
        .map_err(SqlxErrorExt::into_data_error)?
        .unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_keep_their_storage_class() {
        assert_eq!(Param::from_value(&json!(3)), Param::Int(3));
        assert_eq!(Param::from_value(&json!(2.5)), Param::Real(2.5));
        assert_eq!(Param::for_column(ColumnKind::Real, Some(&json!(3))), Param::Real(3.0));
    }

    #[test]
    fn column_kind_drives_encoding() {
        assert_eq!(
            Param::for_column(ColumnKind::Json, Some(&json!({"a": 1}))),
            Param::Text(r#"{"a":1}"#.to_string())
        );
        assert_eq!(
            Param::for_column(ColumnKind::Blob, Some(&json!([1, 2, 255]))),
            Param::Blob(vec![1, 2, 255])
        );
        assert_eq!(Param::for_column(ColumnKind::Text, None), Param::Null);
    }
}
