//! Connector cache behaviour across reads, writes, expiry and peer nodes.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use common::{FlakyInit, RecordingBus, node, settings, settle};
use futures_util::FutureExt;
use geohub_core::{CONNECTOR_ID_LEN, Connector, Marker};
use geohub_db_memory::InMemoryStorage;
use geohub_server::cache::{DynAdminBus, LocalBus, NodeId};
use geohub_server::{CacheError, ConnectorCache};
use geohub_storage::StorageError;
use serde_json::json;

fn local_bus() -> DynAdminBus {
    Arc::new(LocalBus::default())
}

#[tokio::test]
async fn hit_within_ttl_skips_the_store() {
    let storage = Arc::new(InMemoryStorage::with_connectors([Connector::new("c1")]));
    let cache = node(storage.clone(), local_bus()).await;
    let marker = Marker::new();

    let first = cache.get(&marker, "c1").await.unwrap();
    let second = cache.get(&marker, "c1").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(storage.stats().gets, 1);
}

#[tokio::test(start_paused = true)]
async fn miss_after_ttl_reads_the_store_once() {
    let storage = Arc::new(InMemoryStorage::with_connectors([Connector::new("c1")]));
    let cache = node(storage.clone(), local_bus()).await;
    let marker = Marker::new();

    cache.get(&marker, "c1").await.unwrap();
    tokio::time::advance(Duration::from_secs(181)).await;
    assert!(cache.cached("c1").is_none());

    cache.get(&marker, "c1").await.unwrap();
    assert_eq!(storage.stats().gets, 2);
}

#[tokio::test]
async fn writes_invalidate_peers() {
    let storage = Arc::new(InMemoryStorage::with_connectors([
        Connector::new("c1").with_field("rev", json!(1))
    ]));
    let bus = local_bus();
    let a = node(storage.clone(), bus.clone()).await;
    let b = node(storage.clone(), bus.clone()).await;
    let marker = Marker::new();

    a.get(&marker, "c1").await.unwrap();
    b.get(&marker, "c1").await.unwrap();
    assert!(b.cached("c1").is_some());

    let updated = Connector::new("c1").with_field("rev", json!(2));
    a.store(&marker, updated.clone()).await.unwrap();
    assert!(a.cached("c1").is_none(), "origin drops its entry before returning");

    settle().await;
    assert!(b.cached("c1").is_none());
    assert_eq!(b.get(&marker, "c1").await.unwrap(), updated);
}

#[tokio::test]
async fn dropped_store_still_invalidates_peers() {
    let storage = Arc::new(InMemoryStorage::with_connectors([
        Connector::new("c1").with_field("rev", json!(1))
    ]));
    let bus = local_bus();
    let a = node(storage.clone(), bus.clone()).await;
    let b = node(storage.clone(), bus.clone()).await;
    let marker = Marker::new();

    b.get(&marker, "c1").await.unwrap();
    assert!(b.cached("c1").is_some());

    let pending = a
        .store(&marker, Connector::new("c1").with_field("rev", json!(2)))
        .now_or_never();
    assert!(pending.is_none(), "caller gave up before the write finished");

    settle().await;
    assert_eq!(storage.peek("c1").unwrap().extra["rev"], json!(2));
    assert!(b.cached("c1").is_none());
}

#[tokio::test]
async fn ids_are_opaque_strings() {
    let storage = Arc::new(InMemoryStorage::new());
    let cache = node(storage.clone(), local_bus()).await;
    let marker = Marker::new();

    let stored = cache.store(&marker, Connector::new("my connector")).await.unwrap();
    assert_eq!(stored.id(), Some("my connector"));
    assert_eq!(cache.get(&marker, "my connector").await.unwrap(), stored);

    let err = cache.store(&marker, Connector::new("")).await.unwrap_err();
    assert!(matches!(
        err,
        CacheError::Storage(StorageError::InvalidConnector { .. })
    ));
}

#[tokio::test]
async fn store_then_get_returns_stored_form() {
    let storage = Arc::new(InMemoryStorage::new());
    let cache = node(storage.clone(), local_bus()).await;
    let marker = Marker::new();

    let stored = cache
        .store(&marker, Connector::new("c1").with_field("owner", json!("ANONYMOUS")))
        .await
        .unwrap();
    assert!(cache.cached("c1").is_none(), "writes invalidate rather than populate");

    assert_eq!(cache.get(&marker, "c1").await.unwrap(), stored);
    assert_eq!(storage.stats().gets, 1);
}

#[tokio::test]
async fn missing_id_is_generated() {
    let storage = Arc::new(InMemoryStorage::new());
    let cache = node(storage.clone(), local_bus()).await;

    let stored = cache.store(&Marker::new(), Connector::default()).await.unwrap();
    let id = stored.id().expect("generated id");

    assert_eq!(id.len(), CONNECTOR_ID_LEN);
    assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    assert!(storage.peek(id).is_some());
}

#[tokio::test]
async fn supplied_ids_are_never_rewritten() {
    let storage = Arc::new(InMemoryStorage::new());
    let cache = node(storage, local_bus()).await;

    let stored = cache
        .store(&Marker::new(), Connector::new("mine"))
        .await
        .unwrap();
    assert_eq!(stored.id(), Some("mine"));
}

#[tokio::test]
async fn delete_removes_and_returns_record() {
    let storage = Arc::new(InMemoryStorage::with_connectors([Connector::new("c1")]));
    let bus = Arc::new(RecordingBus::default());
    let cache = node(storage.clone(), bus.clone()).await;
    let marker = Marker::new();

    cache.get(&marker, "c1").await.unwrap();
    let deleted = cache.delete(&marker, "c1").await.unwrap();

    assert_eq!(deleted.id(), Some("c1"));
    assert!(cache.cached("c1").is_none());
    assert_eq!(bus.published(), 1);
    assert!(cache.get(&marker, "c1").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn failed_delete_does_not_broadcast() {
    let storage = Arc::new(InMemoryStorage::new());
    let bus = Arc::new(RecordingBus::default());
    let cache = node(storage, bus.clone()).await;

    let err = cache.delete(&Marker::new(), "nope").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(bus.published(), 0);
}

#[tokio::test]
async fn get_all_populates_local_cache_without_broadcast() {
    let storage = Arc::new(InMemoryStorage::with_connectors([
        Connector::new("a"),
        Connector::new("b"),
    ]));
    let bus = Arc::new(RecordingBus::default());
    let cache = node(storage.clone(), bus.clone()).await;
    let marker = Marker::new();

    let all = cache.get_all(&marker).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(cache.cached("a").is_some());
    assert_eq!(bus.published(), 0);

    cache.get(&marker, "b").await.unwrap();
    assert_eq!(storage.stats().gets, 0);
}

#[tokio::test]
async fn store_errors_propagate_verbatim() {
    let storage = Arc::new(InMemoryStorage::with_connectors([Connector::new("c1")]));
    let bus = Arc::new(RecordingBus::default());
    let cache = node(storage.clone(), bus.clone()).await;
    let marker = Marker::new();

    storage.set_failure(Some(StorageError::connection_error("offline")));

    let err = cache.get(&marker, "c1").await.unwrap_err();
    assert!(matches!(err, CacheError::Storage(StorageError::ConnectionError { .. })));
    assert!(cache.cached("c1").is_none());

    let err = cache.store(&marker, Connector::new("c2")).await.unwrap_err();
    assert!(matches!(err, CacheError::Storage(StorageError::ConnectionError { .. })));
    assert_eq!(bus.published(), 0);
}

#[tokio::test]
async fn publish_failure_does_not_fail_the_write() {
    let storage = Arc::new(InMemoryStorage::new());
    let bus = Arc::new(RecordingBus::default());
    bus.fail.store(true, Ordering::SeqCst);
    let cache = node(storage.clone(), bus).await;

    cache.store(&Marker::new(), Connector::new("c1")).await.unwrap();
    assert!(storage.peek("c1").is_some());
}

#[tokio::test]
async fn operations_before_init_are_rejected() {
    let storage = Arc::new(InMemoryStorage::with_connectors([Connector::new("c1")]));
    let cache = ConnectorCache::new(NodeId::new(), storage.clone(), local_bus(), settings());
    let marker = Marker::new();

    assert!(matches!(cache.get(&marker, "c1").await, Err(CacheError::NotReady)));
    assert!(matches!(
        cache.store(&marker, Connector::new("c2")).await,
        Err(CacheError::NotReady)
    ));
    assert_eq!(storage.stats().gets, 0);

    cache.init().await.unwrap();
    assert!(cache.get(&marker, "c1").await.is_ok());
}

#[tokio::test]
async fn init_succeeds_once() {
    let cache = node(Arc::new(InMemoryStorage::new()), local_bus()).await;
    assert!(matches!(cache.init().await, Err(CacheError::AlreadyInitialized)));
}

#[tokio::test]
async fn failed_handshake_can_be_retried() {
    let storage = Arc::new(FlakyInit {
        inner: InMemoryStorage::new(),
        healthy: AtomicBool::new(false),
    });
    let cache = ConnectorCache::new(NodeId::new(), storage.clone(), local_bus(), settings());

    let err = cache.init().await.unwrap_err();
    assert!(matches!(err, CacheError::Storage(StorageError::ConnectionError { .. })));
    assert!(!cache.is_ready());

    storage.healthy.store(true, Ordering::SeqCst);
    cache.init().await.unwrap();
    assert!(cache.is_ready());
}

#[tokio::test]
async fn ready_resolves_after_init() {
    let cache = ConnectorCache::new(
        NodeId::new(),
        Arc::new(InMemoryStorage::new()),
        local_bus(),
        settings(),
    );

    let waiter = tokio::spawn({
        let cache = cache.clone();
        async move { cache.ready().await }
    });
    settle().await;
    assert!(!waiter.is_finished());

    cache.init().await.unwrap();
    waiter.await.unwrap();
}

#[tokio::test]
async fn explicit_invalidate_reaches_peers() {
    let storage = Arc::new(InMemoryStorage::with_connectors([Connector::new("c1")]));
    let bus = local_bus();
    let a = node(storage.clone(), bus.clone()).await;
    let b = node(storage, bus).await;
    let marker = Marker::new();

    b.get(&marker, "c1").await.unwrap();
    a.invalidate(&marker, "c1").await;
    settle().await;

    assert!(b.cached("c1").is_none());
}
