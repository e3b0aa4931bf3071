#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use geohub_core::{Connector, Marker};
use geohub_db_memory::InMemoryStorage;
use geohub_server::cache::{AdminBus, AdminEnvelope, BusError, DynAdminBus, LocalBus, NodeId};
use geohub_server::{CacheSettings, ConnectorCache};
use geohub_storage::{ConnectorStorage, StorageError};
use tokio::sync::broadcast;

/// Local bus that counts publishes and can be told to fail them.
#[derive(Default)]
pub struct RecordingBus {
    inner: LocalBus,
    pub published: AtomicUsize,
    pub fail: AtomicBool,
}

impl RecordingBus {
    pub fn published(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdminBus for RecordingBus {
    async fn publish(&self, envelope: &AdminEnvelope) -> Result<(), BusError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BusError::Unavailable("bus offline".into()));
        }
        self.published.fetch_add(1, Ordering::SeqCst);
        self.inner.publish(envelope).await
    }

    fn subscribe(&self) -> broadcast::Receiver<AdminEnvelope> {
        self.inner.subscribe()
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Store whose handshake fails until `healthy` is set.
pub struct FlakyInit {
    pub inner: InMemoryStorage,
    pub healthy: AtomicBool,
}

#[async_trait]
impl ConnectorStorage for FlakyInit {
    async fn init(&self) -> Result<(), StorageError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::connection_error("database unreachable"))
        }
    }

    async fn get_connector(&self, marker: &Marker, id: &str) -> Result<Connector, StorageError> {
        self.inner.get_connector(marker, id).await
    }

    async fn store_connector(
        &self,
        marker: &Marker,
        connector: &Connector,
    ) -> Result<Connector, StorageError> {
        self.inner.store_connector(marker, connector).await
    }

    async fn delete_connector(&self, marker: &Marker, id: &str) -> Result<Connector, StorageError> {
        self.inner.delete_connector(marker, id).await
    }

    async fn get_all_connectors(&self, marker: &Marker) -> Result<Vec<Connector>, StorageError> {
        self.inner.get_all_connectors(marker).await
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}

pub fn settings() -> CacheSettings {
    CacheSettings::default()
}

/// An initialized cache node over `storage` and `bus`.
pub async fn node(storage: Arc<InMemoryStorage>, bus: DynAdminBus) -> ConnectorCache {
    let cache = ConnectorCache::new(NodeId::new(), storage, bus, settings());
    cache.init().await.expect("init");
    cache
}

/// Lets spawned listener tasks drain the bus.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
