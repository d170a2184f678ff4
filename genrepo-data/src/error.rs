/// Boxed error used for driver failures and transaction action failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur in the data layer.
///
/// Entity names are the short type name of the record (`User`, not
/// `app::model::User`) so messages stay readable without a debugger.
#[derive(Debug)]
pub enum DataError {
    /// Non-positive id, page number or page size, or another argument the
    /// operation cannot accept.
    InvalidArgument(String),
    /// A single-record mutation received no record.
    NullEntity { entity: &'static str },
    /// A batch mutation received a collection with a missing member.
    NullEntityInCollection { entity: &'static str, index: usize },
    /// The record type declares no primary key, or a key field is null.
    NullPrimaryKey { entity: &'static str, detail: String },
    /// A record required to exist was not found.
    EntityNotFound { entity: &'static str, key: String },
    /// Raw SQL text was empty.
    EmptyQuery,
    /// A transaction was rolled back. `message` is the original failure's
    /// message.
    TransactionFailed {
        message: String,
        source: Option<BoxError>,
    },
    /// An aggregate was requested over an empty set.
    EmptySequence {
        entity: &'static str,
        operation: &'static str,
    },
    /// An aggregate result does not fit the selector's value type.
    Overflow {
        entity: &'static str,
        operation: &'static str,
    },
    /// The bound cancellation token fired.
    Cancelled,
    /// The storage context does not provide this capability.
    Unsupported(String),
    Serialization(String),
    Database(BoxError),
    Other(String),
}

impl DataError {
    /// Construct a `Database` variant from any error type.
    ///
    /// Used by backend crates (e.g. `genrepo-data-sqlx`) to wrap
    /// driver-specific errors.
    pub fn database(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        DataError::Database(Box::new(err))
    }

    /// Wrap `err` as the cause of a rolled-back transaction.
    ///
    /// `Cancelled` and errors that already are `TransactionFailed` pass
    /// through unchanged.
    pub fn transaction_failed(err: DataError) -> Self {
        match err {
            DataError::Cancelled | DataError::TransactionFailed { .. } => err,
            other => DataError::TransactionFailed {
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }

    /// Recover a `DataError` from a boxed error. Foreign errors become
    /// `TransactionFailed` carrying their message.
    pub fn from_boxed(err: BoxError) -> Self {
        match err.downcast::<DataError>() {
            Ok(data) => *data,
            Err(other) => DataError::TransactionFailed {
                message: other.to_string(),
                source: Some(other),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DataError::EntityNotFound { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DataError::Cancelled)
    }
}

impl std::fmt::Display for DataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataError::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
            DataError::NullEntity { entity } => write!(f, "{entity} must not be null"),
            DataError::NullEntityInCollection { entity, index } => {
                write!(f, "Collection of {entity} contains a null element at index {index}")
            }
            DataError::NullPrimaryKey { entity, detail } => {
                write!(f, "Primary key of {entity} cannot be resolved: {detail}")
            }
            DataError::EntityNotFound { entity, key } => {
                write!(f, "{entity} with key {key} was not found")
            }
            DataError::EmptyQuery => f.write_str("SQL query must not be null or empty"),
            DataError::TransactionFailed { message, .. } => {
                write!(f, "Transaction failed and was rolled back: {message}")
            }
            DataError::EmptySequence { entity, operation } => {
                write!(f, "Cannot compute {operation} of {entity}: sequence contains no elements")
            }
            DataError::Overflow { entity, operation } => {
                write!(f, "Cannot compute {operation} of {entity}: result overflows the value type")
            }
            DataError::Cancelled => f.write_str("Operation was cancelled"),
            DataError::Unsupported(msg) => write!(f, "Unsupported operation: {msg}"),
            DataError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            DataError::Database(err) => write!(f, "Database error: {err}"),
            DataError::Other(msg) => write!(f, "Data error: {msg}"),
        }
    }
}

impl std::error::Error for DataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DataError::Database(err) => Some(err.as_ref()),
            DataError::TransactionFailed {
                source: Some(err), ..
            } => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_failed_keeps_original_message() {
        let err = DataError::transaction_failed(DataError::EntityNotFound {
            entity: "User",
            key: "7".into(),
        });
        match &err {
            DataError::TransactionFailed { message, source } => {
                assert_eq!(message, "User with key 7 was not found");
                assert!(source.is_some());
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn cancellation_is_not_wrapped() {
        assert!(DataError::transaction_failed(DataError::Cancelled).is_cancelled());
    }

    #[test]
    fn boxed_data_errors_round_trip() {
        let boxed: BoxError = Box::new(DataError::Cancelled);
        assert!(DataError::from_boxed(boxed).is_cancelled());

        let boxed: BoxError = "disk on fire".into();
        match DataError::from_boxed(boxed) {
            DataError::TransactionFailed { message, .. } => assert_eq!(message, "disk on fire"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
