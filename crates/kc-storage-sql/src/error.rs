//! SQL storage error types.

use kc_storage::StorageError;
use sqlx::Error as SqlxError;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const SERIALIZATION_FAILURE: &str = "40001";

/// Converts a `SQLx` error to a storage error.
#[allow(clippy::needless_pass_by_value)]
pub fn from_sqlx_error(err: SqlxError) -> StorageError {
    match err {
        SqlxError::RowNotFound => StorageError::Internal("Row not found".to_string()),
        SqlxError::Database(db_err) => match db_err.code().as_deref() {
            // only the compensating back-reference index can fire here
            Some(UNIQUE_VIOLATION) => {
                StorageError::Conflict(format!("Duplicate entry: {}", db_err.message()))
            }
            Some(SERIALIZATION_FAILURE) => StorageError::Conflict(db_err.message().to_string()),
            Some(FOREIGN_KEY_VIOLATION) => {
                StorageError::InvalidData(format!("Reference violation: {}", db_err.message()))
            }
            _ => StorageError::Query(db_err.to_string()),
        },
        SqlxError::PoolTimedOut => StorageError::Connection("Connection pool timeout".to_string()),
        SqlxError::PoolClosed => StorageError::Connection("Connection pool closed".to_string()),
        SqlxError::Io(e) => StorageError::Connection(e.to_string()),
        SqlxError::ColumnDecode { .. } | SqlxError::Decode(_) => {
            StorageError::Serialization(err.to_string())
        }
        _ => StorageError::Internal(err.to_string()),
    }
}
