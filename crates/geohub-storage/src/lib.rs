//! # geohub-storage
//!
//! Storage abstraction layer for GeoHub connector configurations.
//!
//! This crate defines the [`ConnectorStorage`] trait every backing store
//! implements, the shared [`StorageError`] type, and [`MigratingStorage`],
//! which combines a key-value store with a relational one while connectors
//! move between them. Concrete backends live in separate crates:
//!
//! - `geohub-db-postgres`: relational store
//! - `geohub-db-redis`: key-value store
//! - `geohub-db-memory`: in-process store for tests and local runs
//!
//! ## Example
//!
//! ```ignore
//! use geohub_core::Marker;
//! use geohub_storage::{ConnectorStorage, StorageError};
//!
//! async fn connector_names(storage: &dyn ConnectorStorage) -> Result<Vec<String>, StorageError> {
//!     let marker = Marker::new();
//!     let connectors = storage.get_all_connectors(&marker).await?;
//!     Ok(connectors.into_iter().filter_map(|c| c.id).collect())
//! }
//! ```

mod error;
pub mod migrating;
mod traits;

pub use error::{ErrorCategory, StorageError};
pub use migrating::MigratingStorage;
pub use traits::{ConnectorStorage, validate_connector};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared storage trait object.
pub type DynConnectorStorage = std::sync::Arc<dyn ConnectorStorage>;
