//! PostgreSQL connector store for the GeoHub service.
//!
//! Implements `ConnectorStorage` from `geohub-storage` over a single
//! `connectors(id, config JSONB, created_at, updated_at)` table, using sqlx.
//!
//! # Example
//!
//! ```ignore
//! use geohub_db_postgres::{PostgresConfig, PostgresStorage};
//! use geohub_storage::ConnectorStorage;
//!
//! let storage = PostgresStorage::new(&PostgresConfig::new("postgres://geo@localhost/hub"))?;
//! storage.init().await?; // connect + migrate
//! let all = storage.get_all_connectors(&Marker::new()).await?;
//! ```
//!
//! # Architecture
//!
//! - [`config`]: Configuration types for the store
//! - [`error`]: Error types specific to PostgreSQL operations
//! - [`pool`]: Connection pool management
//! - [`storage`]: The `ConnectorStorage` implementation
//! - [`queries`]: SQL for the connectors table
//! - [`migrations`]: Embedded schema migrations

mod config;
mod error;
mod pool;
mod storage;

/// Database migrations module.
pub mod migrations;

/// SQL query implementations.
pub mod queries;

pub use config::{DEFAULT_URL, PostgresConfig};
pub use error::{PostgresError, Result};
pub use pool::mask_password;
pub use storage::PostgresStorage;

pub use geohub_storage::{ConnectorStorage, StorageError};

/// Type alias for a shareable PostgresStorage instance.
pub type DynPostgresStorage = std::sync::Arc<PostgresStorage>;

/// Creates a PostgreSQL storage wrapped in an `Arc`.
///
/// # Errors
///
/// Returns an error if the pool settings are invalid.
pub fn create_storage(config: &PostgresConfig) -> std::result::Result<DynPostgresStorage, StorageError> {
    Ok(std::sync::Arc::new(PostgresStorage::new(config)?))
}
