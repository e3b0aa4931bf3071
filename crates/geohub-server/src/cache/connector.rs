//! Connector cache facade: read-through TTL cache over a connector store with
//! cluster-wide invalidation.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use geohub_core::{Connector, Marker};
use geohub_storage::{DynConnectorStorage, StorageError};
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, info, instrument};

use super::expiring::ExpiringMap;
use super::gate::InitGate;
use super::pubsub::{DynAdminBus, InvalidationBroadcaster, InvalidationListener, NodeId};

/// Errors returned by [`ConnectorCache`] operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("connector cache is not initialized")]
    NotReady,

    #[error("connector cache is already initialized")]
    AlreadyInitialized,

    #[error("connector task failed: {0}")]
    Task(String),
}

impl CacheError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_not_found())
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_already_exists())
    }
}

/// TTL and reaper cadence for the local connector cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub reaper_interval: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(180),
            reaper_interval: Duration::from_secs(30),
        }
    }
}

struct Inner {
    node: NodeId,
    storage: DynConnectorStorage,
    bus: DynAdminBus,
    entries: Arc<ExpiringMap<String, Connector>>,
    broadcaster: InvalidationBroadcaster,
    gate: InitGate,
    reaper_interval: Duration,
    background: Mutex<Vec<JoinHandle<()>>>,
}

/// Cloneable handle to one node's connector cache.
///
/// Reads are served from a local TTL map and fall through to the store on a
/// miss. Writes and deletes go to the store and then invalidate the id on this
/// node and, through the admin bus, on every peer. Concurrent writes to the
/// same id are not serialized here; the store decides the winner.
#[derive(Clone)]
pub struct ConnectorCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConnectorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorCache")
            .field("node", &self.inner.node)
            .field("backend", &self.inner.storage.backend_name())
            .field("bus", &self.inner.bus.name())
            .field("cached", &self.inner.entries.len())
            .finish()
    }
}

impl ConnectorCache {
    pub fn new(
        node: NodeId,
        storage: DynConnectorStorage,
        bus: DynAdminBus,
        settings: CacheSettings,
    ) -> Self {
        let entries = Arc::new(ExpiringMap::new(settings.ttl));
        let broadcaster = InvalidationBroadcaster::new(node, bus.clone(), entries.clone());
        Self {
            inner: Arc::new(Inner {
                node,
                storage,
                bus,
                entries,
                broadcaster,
                gate: InitGate::new(),
                reaper_interval: settings.reaper_interval,
                background: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.inner.node
    }

    pub fn storage(&self) -> &DynConnectorStorage {
        &self.inner.storage
    }

    pub fn is_ready(&self) -> bool {
        self.inner.gate.is_open()
    }

    /// Resolves once [`ConnectorCache::init`] has succeeded.
    pub async fn ready(&self) {
        self.inner.gate.wait().await;
    }

    /// Performs the store handshake, starts the invalidation listener and the
    /// expiry reaper, then accepts operations.
    ///
    /// Succeeds once. A failed handshake leaves the cache closed and may be
    /// retried.
    #[instrument(skip(self), fields(node = %self.inner.node, backend = self.inner.storage.backend_name()))]
    pub async fn init(&self) -> Result<(), CacheError> {
        let Some(permit) = self.inner.gate.begin().await else {
            return Err(CacheError::AlreadyInitialized);
        };

        if let Err(e) = self.inner.storage.init().await {
            info!(error = %e, category = %e.category(), "connector store handshake failed");
            return Err(e.into());
        }

        let listener = InvalidationListener::new(self.inner.node, &self.inner.entries)
            .spawn(self.inner.bus.subscribe());
        let reaper = self.inner.entries.spawn_reaper(self.inner.reaper_interval);
        if let Ok(mut background) = self.inner.background.lock() {
            background.extend([listener, reaper]);
        }

        permit.open();
        info!(bus = self.inner.bus.name(), ttl_secs = self.inner.entries.ttl().as_secs(), "connector cache ready");
        Ok(())
    }

    fn ensure_ready(&self) -> Result<(), CacheError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(CacheError::NotReady)
        }
    }

    /// Returns the connector, from the local cache when a live entry exists.
    #[instrument(skip(self, marker), fields(marker = %marker))]
    pub async fn get(&self, marker: &Marker, id: &str) -> Result<Connector, CacheError> {
        self.ensure_ready()?;

        if let Some(connector) = self.inner.entries.get(id) {
            debug!("connector cache hit");
            return Ok(connector);
        }

        match self.inner.storage.get_connector(marker, id).await {
            Ok(connector) => {
                self.inner.entries.insert(id.to_string(), connector.clone());
                Ok(connector)
            }
            Err(e) => {
                info!(error = %e, category = %e.category(), "failed to load connector");
                Err(e.into())
            }
        }
    }

    /// Writes a connector, generating an id when it has none.
    ///
    /// Returns the stored form once the write has committed and the id has
    /// been invalidated across the cluster.
    #[instrument(skip(self, marker, connector), fields(marker = %marker, connector_id = ?connector.id()))]
    pub async fn store(&self, marker: &Marker, connector: Connector) -> Result<Connector, CacheError> {
        self.ensure_ready()?;
        self.spawn_mutation(marker, move |inner, marker| async move {
            inner.store(&marker, connector, true).await
        })
        .await
    }

    /// Deletes a connector and returns the removed record.
    #[instrument(skip(self, marker), fields(marker = %marker))]
    pub async fn delete(&self, marker: &Marker, id: &str) -> Result<Connector, CacheError> {
        self.ensure_ready()?;
        let id = id.to_string();
        self.spawn_mutation(marker, move |inner, marker| async move {
            inner.delete(&marker, &id).await
        })
        .await
    }

    /// Lists every connector and refreshes the local cache with the result.
    ///
    /// Peers are not notified.
    #[instrument(skip(self, marker), fields(marker = %marker))]
    pub async fn get_all(&self, marker: &Marker) -> Result<Vec<Connector>, CacheError> {
        self.ensure_ready()?;

        match self.inner.storage.get_all_connectors(marker).await {
            Ok(connectors) => {
                for connector in &connectors {
                    if let Some(id) = connector.id() {
                        self.inner.entries.insert(id.to_string(), connector.clone());
                    }
                }
                debug!(count = connectors.len(), "listed connectors");
                Ok(connectors)
            }
            Err(e) => {
                info!(error = %e, category = %e.category(), "failed to list connectors");
                Err(e.into())
            }
        }
    }

    /// Stores the connector unless one with the same id already exists.
    ///
    /// Fails with `StorageError::AlreadyExists` when it does. The write does not
    /// invalidate any cache, so peers are never notified.
    #[instrument(skip(self, marker, connector), fields(marker = %marker, connector_id = ?connector.id()))]
    pub async fn store_if_not_exists(
        &self,
        marker: &Marker,
        connector: Connector,
    ) -> Result<Connector, CacheError> {
        self.ensure_ready()?;

        if let Some(id) = connector.id() {
            match self.get(marker, id).await {
                Ok(_) => return Err(StorageError::already_exists(id).into()),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        self.spawn_mutation(marker, move |inner, marker| async move {
            inner.store(&marker, connector, false).await
        })
        .await
    }

    /// Peeks at the local cache without touching the store.
    pub fn cached(&self, id: &str) -> Option<Connector> {
        self.inner.entries.get(id)
    }

    /// Drops `id` locally and on every peer.
    pub async fn invalidate(&self, marker: &Marker, id: &str) {
        self.inner.broadcaster.invalidate(marker, id).await;
    }

    /// Stops the listener and reaper tasks.
    pub fn shutdown(&self) {
        if let Ok(mut background) = self.inner.background.lock() {
            for task in background.drain(..) {
                task.abort();
            }
        }
    }

    /// Runs a mutation on its own task so that dropping the caller's future
    /// cannot cancel the invalidation that follows a committed write.
    async fn spawn_mutation<F, Fut>(&self, marker: &Marker, op: F) -> Result<Connector, CacheError>
    where
        F: FnOnce(Arc<Inner>, Marker) -> Fut,
        Fut: Future<Output = Result<Connector, CacheError>> + Send + 'static,
    {
        let task = tokio::spawn(op(self.inner.clone(), marker.clone()).instrument(Span::current()));
        task.await.map_err(|e| CacheError::Task(e.to_string()))?
    }
}

impl Inner {
    async fn store(
        &self,
        marker: &Marker,
        mut connector: Connector,
        invalidate: bool,
    ) -> Result<Connector, CacheError> {
        let id = connector.ensure_id().to_string();

        match self.storage.store_connector(marker, &connector).await {
            Ok(stored) => {
                if invalidate {
                    self.broadcaster.invalidate(marker, &id).await;
                }
                debug!(connector_id = %id, "connector stored");
                Ok(stored)
            }
            Err(e) => {
                info!(connector_id = %id, error = %e, category = %e.category(), "failed to store connector");
                Err(e.into())
            }
        }
    }

    async fn delete(&self, marker: &Marker, id: &str) -> Result<Connector, CacheError> {
        match self.storage.delete_connector(marker, id).await {
            Ok(deleted) => {
                self.broadcaster.invalidate(marker, id).await;
                debug!(connector_id = %id, "connector deleted");
                Ok(deleted)
            }
            Err(e) => {
                info!(connector_id = %id, error = %e, category = %e.category(), "failed to delete connector");
                Err(e.into())
            }
        }
    }
}
