//! Error types for the PostgreSQL connector store.

use geohub_storage::StorageError;
use sqlx_core::error::Error as SqlxError;

/// PostgreSQL error code for undefined table (42P01).
pub const PG_UNDEFINED_TABLE: &str = "42P01";

/// Checks if a sqlx error has a specific PostgreSQL error code.
pub fn has_pg_error_code(err: &SqlxError, code: &str) -> bool {
    if let SqlxError::Database(db_err) = err {
        db_err.code().as_deref() == Some(code)
    } else {
        false
    }
}

/// Checks if a sqlx error is "undefined table" (42P01).
pub fn is_undefined_table(err: &SqlxError) -> bool {
    has_pg_error_code(err, PG_UNDEFINED_TABLE)
}

/// Errors specific to the PostgreSQL connector store.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A stored document could not be read back as a connector.
    #[error("Corrupt connector row {id}: {message}")]
    CorruptRow { id: String, message: String },
}

impl PostgresError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<PostgresError> for StorageError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Database(e) => match &e {
                SqlxError::Io(_)
                | SqlxError::Tls(_)
                | SqlxError::PoolTimedOut
                | SqlxError::PoolClosed
                | SqlxError::WorkerCrashed => StorageError::connection_error(e.to_string()),
                _ if is_undefined_table(&e) => {
                    StorageError::internal(format!("Connector table missing, run migrations: {e}"))
                }
                _ => StorageError::internal(format!("Database error: {e}")),
            },
            PostgresError::Migration(e) => StorageError::internal(format!("Migration error: {e}")),
            PostgresError::Config { message } => {
                StorageError::internal(format!("Configuration error: {message}"))
            }
            PostgresError::CorruptRow { .. } => StorageError::internal(err.to_string()),
        }
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PostgresError::config("invalid URL");
        assert!(err.to_string().contains("Configuration error"));

        let err = PostgresError::Migration("checksum mismatch".into());
        assert_eq!(err.to_string(), "Migration error: checksum mismatch");
    }

    #[test]
    fn test_conversion_to_storage_error() {
        let storage_err: StorageError = PostgresError::config("test error").into();
        assert!(matches!(storage_err, StorageError::Internal { .. }));

        let storage_err: StorageError = PostgresError::Database(SqlxError::PoolTimedOut).into();
        assert!(matches!(storage_err, StorageError::ConnectionError { .. }));

        let storage_err: StorageError = PostgresError::Database(SqlxError::RowNotFound).into();
        assert!(matches!(storage_err, StorageError::Internal { .. }));
    }
}
