//! In-memory connector storage backend for the GeoHub service.
//!
//! This crate provides an in-memory implementation of the `ConnectorStorage`
//! trait from `geohub-storage`, using the papaya lock-free HashMap for
//! concurrent access. Each operation is counted so callers can observe how
//! often the cache falls through to its backing store.
//!
//! # Example
//!
//! ```ignore
//! use geohub_core::{Connector, Marker};
//! use geohub_db_memory::InMemoryStorage;
//! use geohub_storage::ConnectorStorage;
//!
//! let storage = InMemoryStorage::new();
//! storage.store_connector(&Marker::new(), &Connector::new("psql")).await?;
//! assert_eq!(storage.stats().stores, 1);
//! ```

pub mod storage;

pub use geohub_storage::{ConnectorStorage, StorageError};
pub use storage::{InMemoryStorage, OperationStats};

/// Creates a new shared in-memory connector storage.
pub fn create_storage() -> std::sync::Arc<InMemoryStorage> {
    std::sync::Arc::new(InMemoryStorage::new())
}
