//! Storage traits for the connector storage abstraction layer.

use async_trait::async_trait;
use geohub_core::{Connector, Marker};

use crate::error::StorageError;

/// The capability set every connector backing store implements.
///
/// Each operation receives the caller's correlation marker so the backend can
/// attach it to its own log records. Implementations must be thread-safe
/// (`Send + Sync`).
///
/// # Example
///
/// ```ignore
/// use geohub_storage::{ConnectorStorage, StorageError};
///
/// async fn exists(storage: &dyn ConnectorStorage, marker: &Marker, id: &str) -> Result<bool, StorageError> {
///     match storage.get_connector(marker, id).await {
///         Ok(_) => Ok(true),
///         Err(e) if e.is_not_found() => Ok(false),
///         Err(e) => Err(e),
///     }
/// }
/// ```
#[async_trait]
pub trait ConnectorStorage: Send + Sync {
    /// Performs the one-time handshake with the backend (connect, migrate, ping).
    ///
    /// Called once before any other operation.
    async fn init(&self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Reads a connector by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no connector has this ID.
    async fn get_connector(&self, marker: &Marker, id: &str) -> Result<Connector, StorageError>;

    /// Inserts or replaces a connector and returns the stored form.
    ///
    /// The stored form may differ from the input by fields the backend assigns.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidConnector` if the connector has no usable ID.
    async fn store_connector(
        &self,
        marker: &Marker,
        connector: &Connector,
    ) -> Result<Connector, StorageError>;

    /// Deletes a connector and returns the record that was removed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no connector has this ID.
    async fn delete_connector(&self, marker: &Marker, id: &str)
    -> Result<Connector, StorageError>;

    /// Lists every stored connector.
    async fn get_all_connectors(&self, marker: &Marker) -> Result<Vec<Connector>, StorageError>;

    /// Returns the name of this storage backend for logging.
    fn backend_name(&self) -> &'static str;
}

/// Validates a connector before it is written and returns its ID.
///
/// # Errors
///
/// Returns `StorageError::InvalidConnector` if the ID is missing or malformed.
pub fn validate_connector(connector: &Connector) -> Result<&str, StorageError> {
    connector.validate().map_err(StorageError::from)
}
