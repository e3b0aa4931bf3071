//! Redis connector store for the GeoHub service.
//!
//! Connectors live in one Redis hash (field = id, value = JSON). The same
//! [`RedisConfig`] also builds the pool used by the cluster admin bus.

mod config;
mod error;
mod storage;

pub use config::RedisConfig;
pub use error::RedisStoreError;
pub use storage::RedisHashStorage;

pub use geohub_storage::{ConnectorStorage, StorageError};

/// Builds a pool from `config` and wraps it in a hash store named `table`.
///
/// # Errors
///
/// Returns an error if the pool cannot be created.
pub fn create_storage(
    config: &RedisConfig,
    table: impl Into<String>,
) -> Result<std::sync::Arc<RedisHashStorage>, StorageError> {
    let pool = config.create_pool()?;
    Ok(std::sync::Arc::new(RedisHashStorage::new(pool, table)))
}
