use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use geohub_core::{Connector, Marker};
use geohub_storage::{ConnectorStorage, StorageError, validate_connector};
use papaya::HashMap as PapayaHashMap;
use tracing::debug;

/// Snapshot of how many times each storage operation was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationStats {
    pub gets: u64,
    pub stores: u64,
    pub deletes: u64,
    pub lists: u64,
}

#[derive(Debug, Default)]
struct OperationCounters {
    gets: AtomicU64,
    stores: AtomicU64,
    deletes: AtomicU64,
    lists: AtomicU64,
}

/// In-memory connector storage using papaya lock-free HashMap.
///
/// This storage implementation provides:
/// - Lock-free concurrent access via papaya::HashMap
/// - Upsert semantics on store
/// - Per-operation call counters
/// - Failure injection for exercising error paths
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    data: PapayaHashMap<String, Connector>,
    counters: OperationCounters,
    /// When set, every operation fails with this error until cleared.
    failure: Mutex<Option<StorageError>>,
}

impl InMemoryStorage {
    /// Creates a new empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a storage pre-populated with the given connectors.
    ///
    /// Connectors without an ID are skipped. Seeding is not counted as a store.
    pub fn with_connectors(connectors: impl IntoIterator<Item = Connector>) -> Self {
        let storage = Self::new();
        {
            let guard = storage.data.pin();
            for connector in connectors {
                if let Some(id) = connector.id.clone() {
                    guard.insert(id, connector);
                }
            }
        }
        storage
    }

    /// Returns the call counters.
    pub fn stats(&self) -> OperationStats {
        OperationStats {
            gets: self.counters.gets.load(Ordering::SeqCst),
            stores: self.counters.stores.load(Ordering::SeqCst),
            deletes: self.counters.deletes.load(Ordering::SeqCst),
            lists: self.counters.lists.load(Ordering::SeqCst),
        }
    }

    /// Makes every subsequent operation fail with `error`; `None` restores normal behaviour.
    pub fn set_failure(&self, error: Option<StorageError>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = error;
        }
    }

    /// Returns the stored connector without counting a read.
    pub fn peek(&self, id: &str) -> Option<Connector> {
        self.data.pin().get(id).cloned()
    }

    /// Number of stored connectors.
    pub fn len(&self) -> usize {
        self.data.pin().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_failure(&self) -> Result<(), StorageError> {
        match self.failure.lock() {
            Ok(failure) => match failure.as_ref() {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            },
            Err(_) => Err(StorageError::internal("failure injection lock poisoned")),
        }
    }
}

#[async_trait]
impl ConnectorStorage for InMemoryStorage {
    async fn get_connector(&self, marker: &Marker, id: &str) -> Result<Connector, StorageError> {
        self.counters.gets.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        let guard = self.data.pin();
        match guard.get(id) {
            Some(connector) => Ok(connector.clone()),
            None => {
                debug!(%marker, connector_id = %id, "connector not in memory store");
                Err(StorageError::not_found(id))
            }
        }
    }

    async fn store_connector(
        &self,
        _marker: &Marker,
        connector: &Connector,
    ) -> Result<Connector, StorageError> {
        self.counters.stores.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        let id = validate_connector(connector)?.to_string();
        let guard = self.data.pin();
        guard.insert(id, connector.clone());
        Ok(connector.clone())
    }

    async fn delete_connector(
        &self,
        _marker: &Marker,
        id: &str,
    ) -> Result<Connector, StorageError> {
        self.counters.deletes.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        let guard = self.data.pin();
        guard
            .remove(id)
            .cloned()
            .ok_or_else(|| StorageError::not_found(id))
    }

    async fn get_all_connectors(&self, _marker: &Marker) -> Result<Vec<Connector>, StorageError> {
        self.counters.lists.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        let guard = self.data.pin();
        let mut connectors: Vec<Connector> = guard.iter().map(|(_, c)| c.clone()).collect();
        connectors.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(connectors)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
