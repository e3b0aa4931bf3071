//! Error types for the Redis connector store.

use geohub_storage::StorageError;

/// Errors specific to the Redis connector store.
#[derive(Debug, thiserror::Error)]
pub enum RedisStoreError {
    /// The pool could not be built from the configuration.
    #[error("Failed to create Redis pool: {0}")]
    CreatePool(#[from] deadpool_redis::CreatePoolError),

    /// No connection could be checked out of the pool.
    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// A command failed.
    #[error("Redis command failed: {0}")]
    Command(#[from] redis::RedisError),

    /// A hash field holds something that is not a connector document.
    #[error("Corrupt connector {id} in {table}: {message}")]
    CorruptValue {
        table: String,
        id: String,
        message: String,
    },
}

impl From<RedisStoreError> for StorageError {
    fn from(err: RedisStoreError) -> Self {
        match &err {
            RedisStoreError::CreatePool(_) => StorageError::internal(err.to_string()),
            RedisStoreError::Pool(_) => StorageError::connection_error(err.to_string()),
            RedisStoreError::Command(e)
                if e.is_io_error() || e.is_connection_dropped() || e.is_timeout() =>
            {
                StorageError::connection_error(err.to_string())
            }
            RedisStoreError::Command(_) | RedisStoreError::CorruptValue { .. } => {
                StorageError::internal(err.to_string())
            }
        }
    }
}
