/// Errors raised by [`EntityMapper`](crate::EntityMapper).
#[derive(Debug)]
pub enum MapError {
    /// The value handed to the mapper was absent.
    NullInput { type_name: String },
    /// The target declares a field the source does not have.
    MissingField {
        field: String,
        source_type: String,
        target_type: String,
    },
    /// Both shapes declare the field but the source type cannot be
    /// assigned into the target type.
    IncompatibleField {
        field: String,
        source_type: String,
        target_type: String,
        source_field_type: String,
        target_field_type: String,
    },
    /// Serde could not move the value between the two shapes.
    Serialization(String),
}

impl MapError {
    /// `true` for the field-level mapping failures (missing or incompatible
    /// field), as opposed to null input or serde failures.
    pub fn is_mapping_error(&self) -> bool {
        matches!(
            self,
            MapError::MissingField { .. } | MapError::IncompatibleField { .. }
        )
    }
}

impl std::fmt::Display for MapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MapError::NullInput { type_name } => {
                write!(f, "Cannot map a null {type_name}")
            }
            MapError::MissingField {
                field,
                source_type,
                target_type,
            } => write!(
                f,
                "Mapping error: field '{field}' of {target_type} has no counterpart on {source_type}"
            ),
            MapError::IncompatibleField {
                field,
                source_type,
                target_type,
                source_field_type,
                target_field_type,
            } => write!(
                f,
                "Mapping error: {source_type}.{field} ({source_field_type}) is not assignable to {target_type}.{field} ({target_field_type})"
            ),
            MapError::Serialization(msg) => write!(f, "Mapping serialization error: {msg}"),
        }
    }
}

impl std::error::Error for MapError {}
