use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::DataError;
use crate::filter::Filter;

/// Storage class of a column. Drives value decoding in SQL backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Real,
    Text,
    Boolean,
    Blob,
    /// Any serde value stored as JSON text.
    Json,
}

/// A persisted column of an [`Entity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

impl Column {
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self { name, kind }
    }
}

/// A record type the repository can persist.
///
/// Metadata is declarative: the table, its columns and the ordered
/// primary-key fields. Field values are read through serde only to resolve
/// keys and to evaluate filters.
///
/// Intended to be implemented via `#[derive(Entity)]`.
///
/// # Example
///
/// ```ignore
/// impl Entity for User {
///     fn table_name() -> &'static str { "users" }
///     fn columns() -> &'static [Column] {
///         const COLUMNS: &[Column] = &[
///             Column::new("id", ColumnKind::Integer),
///             Column::new("name", ColumnKind::Text),
///         ];
///         COLUMNS
///     }
///     fn primary_key() -> &'static [&'static str] { &["id"] }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    fn table_name() -> &'static str;

    /// Persisted columns. Relation fields are not columns.
    fn columns() -> &'static [Column];

    /// Ordered primary-key field names. Empty means no key is declared.
    fn primary_key() -> &'static [&'static str];

    /// Short type name used in error messages.
    fn entity_name() -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    fn column(name: &str) -> Option<&'static Column> {
        Self::columns().iter().find(|c| c.name == name)
    }
}

/// Serialize a record into its named fields.
pub fn record_fields<T: Entity>(record: &T) -> Result<Map<String, Value>, DataError> {
    match serde_json::to_value(record)? {
        Value::Object(fields) => Ok(fields),
        other => Err(DataError::Serialization(format!(
            "{} serialized to {other} instead of an object",
            T::entity_name()
        ))),
    }
}

/// Primary-key value of a record: one JSON scalar per key field, in
/// declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Key(Vec<Value>);

impl Key {
    pub fn composite(values: Vec<Value>) -> Self {
        Key(values)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Resolve the key of `record` from its declared key fields.
    pub fn of<T: Entity>(record: &T) -> Result<Self, DataError> {
        Self::of_named::<T>(T::primary_key(), record)
    }

    /// Resolve the key of `record` from the named key fields.
    pub fn of_named<T: Entity>(key_fields: &[&str], record: &T) -> Result<Self, DataError> {
        Self::from_fields_named::<T>(key_fields, &record_fields(record)?)
    }

    /// Resolve the key from already serialized fields.
    pub fn from_fields<T: Entity>(fields: &Map<String, Value>) -> Result<Self, DataError> {
        Self::from_fields_named::<T>(T::primary_key(), fields)
    }

    /// Resolve the key from serialized fields and the named key fields.
    pub fn from_fields_named<T: Entity>(
        key_fields: &[&str],
        fields: &Map<String, Value>,
    ) -> Result<Self, DataError> {
        if key_fields.is_empty() {
            return Err(no_primary_key::<T>());
        }
        let mut values = Vec::with_capacity(key_fields.len());
        for name in key_fields {
            match fields.get(*name) {
                None | Some(Value::Null) => {
                    return Err(DataError::NullPrimaryKey {
                        entity: T::entity_name(),
                        detail: format!("key field '{name}' is null"),
                    })
                }
                Some(v) => values.push(v.clone()),
            }
        }
        Ok(Key(values))
    }

    /// Equality filter selecting the row with this key.
    pub fn to_filter<T: Entity>(&self) -> Result<Filter, DataError> {
        self.filter_named::<T>(T::primary_key())
    }

    /// Equality filter over the named key fields.
    pub fn filter_named<T: Entity>(&self, key_fields: &[&str]) -> Result<Filter, DataError> {
        if key_fields.is_empty() {
            return Err(no_primary_key::<T>());
        }
        if key_fields.len() != self.0.len() {
            return Err(DataError::InvalidArgument(format!(
                "{} has {} key field(s), got a key with {} value(s)",
                T::entity_name(),
                key_fields.len(),
                self.0.len()
            )));
        }
        Ok(Filter::all(
            key_fields
                .iter()
                .zip(&self.0)
                .map(|(name, value)| Filter::eq(*name, value.clone())),
        ))
    }

    /// Stable textual identity, used as a map key by in-process stores.
    pub fn storage_id(&self) -> String {
        Value::Array(self.0.clone()).to_string()
    }
}

pub(crate) fn no_primary_key<T: Entity>() -> DataError {
    DataError::NullPrimaryKey {
        entity: T::entity_name(),
        detail: "no primary key is declared".to_string(),
    }
}

impl From<i64> for Key {
    fn from(id: i64) -> Self {
        Key(vec![Value::from(id)])
    }
}

impl From<&str> for Key {
    fn from(id: &str) -> Self {
        Key(vec![Value::from(id)])
    }
}

impl From<String> for Key {
    fn from(id: String) -> Self {
        Key(vec![Value::from(id)])
    }
}

impl From<Value> for Key {
    fn from(id: Value) -> Self {
        Key(vec![id])
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn scalar(v: &Value) -> String {
            match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }
        }
        match self.0.as_slice() {
            [single] => f.write_str(&scalar(single)),
            many => {
                let parts: Vec<String> = many.iter().map(scalar).collect();
                write!(f, "({})", parts.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Enrollment {
        student: i64,
        course: Option<String>,
        grade: f64,
    }

    impl Entity for Enrollment {
        fn table_name() -> &'static str {
            "enrollments"
        }
        fn columns() -> &'static [Column] {
            const COLUMNS: &[Column] = &[
                Column::new("student", ColumnKind::Integer),
                Column::new("course", ColumnKind::Text),
                Column::new("grade", ColumnKind::Real),
            ];
            COLUMNS
        }
        fn primary_key() -> &'static [&'static str] {
            &["student", "course"]
        }
    }

    #[test]
    fn composite_key_resolution() {
        let e = Enrollment {
            student: 4,
            course: Some("math".into()),
            grade: 3.5,
        };
        let key = Key::of(&e).unwrap();
        assert_eq!(key.values().len(), 2);
        assert_eq!(key.to_string(), "(4, math)");
        assert_eq!(key.storage_id(), "[4,\"math\"]");
    }

    #[test]
    fn null_key_field_is_reported() {
        let e = Enrollment {
            student: 4,
            course: None,
            grade: 3.5,
        };
        match Key::of(&e).unwrap_err() {
            DataError::NullPrimaryKey { entity, detail } => {
                assert_eq!(entity, "Enrollment");
                assert!(detail.contains("course"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn key_arity_is_checked_against_metadata() {
        let err = Key::from(4i64).to_filter::<Enrollment>().unwrap_err();
        assert!(matches!(err, DataError::InvalidArgument(_)));
    }

    #[test]
    fn entity_name_is_short() {
        assert_eq!(Enrollment::entity_name(), "Enrollment");
        assert_eq!(Enrollment::column("grade").map(|c| c.kind), Some(ColumnKind::Real));
    }
}
