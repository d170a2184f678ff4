use genrepo_data::DataError;

/// Extension trait for converting `sqlx::Error` into `DataError`.
///
/// Due to Rust's orphan rules, we can't implement `From<sqlx::Error> for DataError`
/// in this crate. Instead, use `.into_data_error()`.
pub trait SqlxErrorExt {
    fn into_data_error(self) -> DataError;
}

impl SqlxErrorExt for sqlx::Error {
    fn into_data_error(self) -> DataError {
        match self {
            sqlx::Error::RowNotFound => DataError::Other("row not found".into()),
            sqlx::Error::ColumnDecode { index, source } => {
                DataError::Serialization(format!("column {index}: {source}"))
            }
            other => DataError::database(other),
        }
    }
}

/// Convenience alias for data-layer results using `DataError`.
pub type SqlxResult<T> = Result<T, DataError>;
