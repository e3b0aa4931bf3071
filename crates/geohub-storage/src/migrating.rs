//! MigratingStorage - serves connectors while they move from a relational
//! store to a key-value store.
//!
//! Writes go to both stores so either can serve reads. Reads prefer the
//! key-value store and fall back to the relational one for connectors that
//! have not been rewritten since the migration started.

use std::collections::BTreeMap;

use async_trait::async_trait;
use geohub_core::{Connector, Marker};
use tracing::debug;

use crate::DynConnectorStorage;
use crate::error::StorageError;
use crate::traits::{ConnectorStorage, validate_connector};

/// A storage wrapper that writes to two stores and reads key-value first.
pub struct MigratingStorage {
    /// Target of the migration; consulted first on reads.
    key_value: DynConnectorStorage,
    /// Store being migrated away from.
    relational: DynConnectorStorage,
}

impl MigratingStorage {
    /// Create a new migrating storage over a key-value and a relational store.
    pub fn new(key_value: DynConnectorStorage, relational: DynConnectorStorage) -> Self {
        Self {
            key_value,
            relational,
        }
    }
}

#[async_trait]
impl ConnectorStorage for MigratingStorage {
    async fn init(&self) -> Result<(), StorageError> {
        self.relational.init().await?;
        self.key_value.init().await
    }

    async fn get_connector(&self, marker: &Marker, id: &str) -> Result<Connector, StorageError> {
        match self.key_value.get_connector(marker, id).await {
            Err(e) if e.is_not_found() => {
                debug!(%marker, connector_id = %id, "not in key-value store, reading relational store");
                self.relational.get_connector(marker, id).await
            }
            result => result,
        }
    }

    async fn store_connector(
        &self,
        marker: &Marker,
        connector: &Connector,
    ) -> Result<Connector, StorageError> {
        validate_connector(connector)?;
        self.relational.store_connector(marker, connector).await?;
        self.key_value.store_connector(marker, connector).await
    }

    async fn delete_connector(
        &self,
        marker: &Marker,
        id: &str,
    ) -> Result<Connector, StorageError> {
        let relational = self.relational.delete_connector(marker, id).await;
        let key_value = self.key_value.delete_connector(marker, id).await;

        match (key_value, relational) {
            (Err(e), _) | (_, Err(e)) if !e.is_not_found() => Err(e),
            (Ok(deleted), _) | (_, Ok(deleted)) => Ok(deleted),
            (Err(e), Err(_)) => Err(e),
        }
    }

    async fn get_all_connectors(&self, marker: &Marker) -> Result<Vec<Connector>, StorageError> {
        let mut by_id: BTreeMap<String, Connector> = BTreeMap::new();

        for connector in self.relational.get_all_connectors(marker).await? {
            if let Some(id) = connector.id.clone() {
                by_id.insert(id, connector);
            }
        }
        for connector in self.key_value.get_all_connectors(marker).await? {
            if let Some(id) = connector.id.clone() {
                by_id.insert(id, connector);
            }
        }

        Ok(by_id.into_values().collect())
    }

    fn backend_name(&self) -> &'static str {
        "migrating"
    }
}
