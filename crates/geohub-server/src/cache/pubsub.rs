//! Cluster admin bus for cross-node connector cache invalidation.
//!
//! ## How It Works
//!
//! ```text
//! Node A: store("c1") succeeds
//!   ↓ remove "c1" from local cache
//!   ↓ publish {"source": A, "message": {"type": "InvalidateById", "id": "c1", ...}}
//! Node B: listener receives envelope → removes "c1" from its cache
//! Node A: listener receives its own envelope → skips it
//! ```

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::Pool;
use geohub_core::{Connector, Marker};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::expiring::ExpiringMap;

/// Default Redis channel for admin messages.
pub const DEFAULT_CHANNEL: &str = "geohub:admin";

/// Buffered envelopes per subscriber before it is reported as lagging.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Identity of one service instance on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Source of notices raised by the bus itself rather than a node.
    pub const fn bus() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Cache-management messages exchanged between nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AdminMessage {
    /// Drop the cached connector with this id.
    #[serde(rename_all = "camelCase")]
    InvalidateById {
        id: String,
        /// Whether the publishing node also applies the message.
        broadcast_include_local_node: bool,
    },
    /// Drop every cached connector.
    InvalidateAll,
}

impl AdminMessage {
    pub fn invalidate(id: impl Into<String>) -> Self {
        Self::InvalidateById {
            id: id.into(),
            broadcast_include_local_node: true,
        }
    }
}

/// An [`AdminMessage`] tagged with the node that published it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminEnvelope {
    pub source: NodeId,
    pub message: AdminMessage,
}

/// Errors from publishing on the admin bus.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to get Redis connection: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("failed to publish admin message: {0}")]
    Publish(#[from] redis::RedisError),

    #[error("failed to encode admin message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("admin bus is unavailable: {0}")]
    Unavailable(String),
}

/// A publish-subscribe channel shared by all nodes of a cluster.
#[async_trait]
pub trait AdminBus: Send + Sync {
    async fn publish(&self, envelope: &AdminEnvelope) -> Result<(), BusError>;

    /// Returns a receiver for every envelope published after this call.
    fn subscribe(&self) -> broadcast::Receiver<AdminEnvelope>;

    fn name(&self) -> &'static str;
}

/// Shareable admin bus handle.
pub type DynAdminBus = Arc<dyn AdminBus>;

/// In-process bus. Clones share one channel, so several nodes in the same
/// process see each other's messages.
#[derive(Debug, Clone)]
pub struct LocalBus {
    sender: broadcast::Sender<AdminEnvelope>,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

#[async_trait]
impl AdminBus for LocalBus {
    async fn publish(&self, envelope: &AdminEnvelope) -> Result<(), BusError> {
        // No subscribers is not an error: there is simply nobody to notify.
        let _ = self.sender.send(envelope.clone());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AdminEnvelope> {
        self.sender.subscribe()
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Bus over a Redis pub/sub channel.
///
/// Publishing uses the shared pool. A background subscriber started with
/// [`RedisBus::start`] holds a dedicated pub/sub connection and forwards every
/// decoded envelope to local subscribers.
#[derive(Clone)]
pub struct RedisBus {
    pool: Pool,
    url: String,
    channel: String,
    local: broadcast::Sender<AdminEnvelope>,
}

impl RedisBus {
    pub fn new(pool: Pool, url: impl Into<String>, channel: impl Into<String>) -> Self {
        let (local, _) = broadcast::channel(DEFAULT_BUS_CAPACITY);
        Self {
            pool,
            url: url.into(),
            channel: channel.into(),
            local,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Spawns the subscriber, reconnecting with exponential backoff when the
    /// pub/sub connection is lost.
    ///
    /// Messages published while disconnected are lost, so every resubscribe
    /// raises a local [`AdminMessage::InvalidateAll`].
    pub fn start(&self) -> JoinHandle<()> {
        let bus = self.clone();
        tokio::spawn(async move {
            let mut backoff = Backoff::default();
            let mut subscribed_before = false;

            loop {
                let e = bus.run(&mut backoff, &mut subscribed_before).await;
                let delay = backoff.next_delay();
                tracing::error!(
                    error = %e,
                    channel = %bus.channel,
                    backoff_secs = delay.as_secs(),
                    "Admin bus subscriber error, reconnecting..."
                );
                tokio::time::sleep(delay).await;
            }
        })
    }

    /// Runs one subscription and returns why it ended.
    async fn run(&self, backoff: &mut Backoff, subscribed_before: &mut bool) -> String {
        use futures_util::StreamExt;

        let client = match redis::Client::open(self.url.clone()) {
            Ok(client) => client,
            Err(e) => return format!("failed to create Redis client: {e}"),
        };
        let mut pubsub = match client.get_async_pubsub().await {
            Ok(pubsub) => pubsub,
            Err(e) => return format!("failed to get pub/sub connection: {e}"),
        };
        if let Err(e) = pubsub.subscribe(&self.channel).await {
            return format!("failed to subscribe: {e}");
        }

        info!(channel = %self.channel, "Subscribed to admin bus");
        backoff.reset();
        if std::mem::replace(subscribed_before, true) {
            self.announce_resubscribed();
        }

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let decoded = msg
                .get_payload::<String>()
                .map_err(|e| e.to_string())
                .and_then(|raw| {
                    serde_json::from_str::<AdminEnvelope>(&raw).map_err(|e| e.to_string())
                });
            match decoded {
                Ok(envelope) => {
                    let _ = self.local.send(envelope);
                }
                Err(e) => warn!(error = %e, "ignoring malformed admin message"),
            }
        }
        "pub/sub connection closed".to_string()
    }

    fn announce_resubscribed(&self) {
        warn!(channel = %self.channel, "admin bus resubscribed, invalidating local caches");
        let _ = self.local.send(resubscribe_notice());
    }
}

fn resubscribe_notice() -> AdminEnvelope {
    AdminEnvelope {
        source: NodeId::bus(),
        message: AdminMessage::InvalidateAll,
    }
}

/// Reconnect delay: doubles per failure up to a cap, back to the start once
/// a subscription succeeds.
#[derive(Debug)]
struct Backoff {
    current: Duration,
}

impl Backoff {
    const INITIAL: Duration = Duration::from_secs(1);
    const MAX: Duration = Duration::from_secs(300);

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(Self::MAX);
        delay
    }

    fn reset(&mut self) {
        self.current = Self::INITIAL;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            current: Self::INITIAL,
        }
    }
}

impl fmt::Debug for RedisBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBus")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AdminBus for RedisBus {
    async fn publish(&self, envelope: &AdminEnvelope) -> Result<(), BusError> {
        let payload = serde_json::to_string(envelope)?;
        let mut conn = self.pool.get().await?;
        conn.publish::<_, _, ()>(&self.channel, payload).await?;
        debug!(channel = %self.channel, "published admin message");
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AdminEnvelope> {
        self.local.subscribe()
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Publishes invalidations for one node.
#[derive(Clone)]
pub struct InvalidationBroadcaster {
    node: NodeId,
    bus: DynAdminBus,
    entries: Arc<ExpiringMap<String, Connector>>,
}

impl InvalidationBroadcaster {
    pub fn new(node: NodeId, bus: DynAdminBus, entries: Arc<ExpiringMap<String, Connector>>) -> Self {
        Self { node, bus, entries }
    }

    /// Drops `id` locally, then tells the other nodes to do the same.
    ///
    /// Publish failures are logged and swallowed; peers fall back to TTL expiry.
    pub async fn invalidate(&self, marker: &Marker, id: &str) {
        let message = AdminMessage::invalidate(id);
        if let AdminMessage::InvalidateById {
            broadcast_include_local_node: true,
            ..
        } = message
        {
            self.entries.remove(id);
        }

        let envelope = AdminEnvelope {
            source: self.node,
            message,
        };
        if let Err(e) = self.bus.publish(&envelope).await {
            info!(%marker, connector_id = %id, bus = self.bus.name(), error = %e, "failed to publish cache invalidation");
        }
    }
}

/// Applies invalidations received from other nodes.
pub struct InvalidationListener {
    node: NodeId,
    entries: Weak<ExpiringMap<String, Connector>>,
}

impl InvalidationListener {
    pub fn new(node: NodeId, entries: &Arc<ExpiringMap<String, Connector>>) -> Self {
        Self {
            node,
            entries: Arc::downgrade(entries),
        }
    }

    /// Consumes `receiver` on a background task until the bus closes or the
    /// cache is dropped.
    pub fn spawn(self, mut receiver: broadcast::Receiver<AdminEnvelope>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let received = receiver.recv().await;
                let Some(entries) = self.entries.upgrade() else {
                    break;
                };
                match received {
                    Ok(envelope) => self.apply(&entries, envelope),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "admin bus receiver lagged, clearing connector cache");
                        entries.clear();
                    }
                    Err(RecvError::Closed) => {
                        debug!("admin bus closed, stopping invalidation listener");
                        break;
                    }
                }
            }
        })
    }

    fn apply(&self, entries: &ExpiringMap<String, Connector>, envelope: AdminEnvelope) {
        match envelope.message {
            AdminMessage::InvalidateAll => {
                debug!(source = %envelope.source, "clearing connector cache");
                entries.clear();
            }
            // Our own envelopes were either applied before publishing or were
            // meant for peers only.
            AdminMessage::InvalidateById { .. } if envelope.source == self.node => {}
            AdminMessage::InvalidateById { id, .. } => {
                debug!(connector_id = %id, source = %envelope.source, "invalidating cached connector");
                entries.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries() -> Arc<ExpiringMap<String, Connector>> {
        Arc::new(ExpiringMap::new(Duration::from_secs(180)))
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn envelope_wire_format() {
        let node = NodeId::new();
        let envelope = AdminEnvelope {
            source: node,
            message: AdminMessage::invalidate("c1"),
        };

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({
                "source": node.to_string(),
                "message": {
                    "type": "InvalidateById",
                    "id": "c1",
                    "broadcastIncludeLocalNode": true
                }
            })
        );
        let back: AdminEnvelope = serde_json::from_value(value).unwrap();
        assert_eq!(back, envelope);
    }

    #[tokio::test]
    async fn local_bus_publish_without_subscribers_is_ok() {
        let bus = LocalBus::default();
        let envelope = AdminEnvelope {
            source: NodeId::new(),
            message: AdminMessage::invalidate("x"),
        };
        assert!(bus.publish(&envelope).await.is_ok());
    }

    #[tokio::test]
    async fn broadcaster_removes_locally_and_peers_follow() {
        let bus: DynAdminBus = Arc::new(LocalBus::default());
        let (a, b) = (NodeId::new(), NodeId::new());
        let (entries_a, entries_b) = (entries(), entries());
        InvalidationListener::new(a, &entries_a).spawn(bus.subscribe());
        InvalidationListener::new(b, &entries_b).spawn(bus.subscribe());

        entries_a.insert("c1".into(), Connector::new("c1"));
        entries_b.insert("c1".into(), Connector::new("c1"));

        let broadcaster = InvalidationBroadcaster::new(a, bus.clone(), entries_a.clone());
        broadcaster.invalidate(&Marker::new(), "c1").await;
        assert!(entries_a.get("c1").is_none(), "local removal is synchronous");

        settle().await;
        assert!(entries_b.get("c1").is_none());
    }

    #[tokio::test]
    async fn own_envelopes_are_skipped() {
        let bus = LocalBus::default();
        let node = NodeId::new();
        let entries = entries();
        InvalidationListener::new(node, &entries).spawn(bus.subscribe());
        entries.insert("c1".into(), Connector::new("c1"));

        bus.publish(&AdminEnvelope {
            source: node,
            message: AdminMessage::invalidate("c1"),
        })
        .await
        .unwrap();
        settle().await;

        assert!(entries.get("c1").is_some());
    }

    #[tokio::test]
    async fn lagging_listener_clears_the_cache() {
        let bus = LocalBus::new(1);
        let node = NodeId::new();
        let entries = entries();
        let receiver = bus.subscribe();
        entries.insert("keep".into(), Connector::new("keep"));

        let peer = NodeId::new();
        for id in ["a", "b", "c"] {
            bus.publish(&AdminEnvelope {
                source: peer,
                message: AdminMessage::invalidate(id),
            })
            .await
            .unwrap();
        }

        InvalidationListener::new(node, &entries).spawn(receiver);
        settle().await;
        assert!(entries.is_empty());
    }

    #[test]
    fn backoff_doubles_to_cap_and_resets() {
        let mut backoff = Backoff::default();
        let delays: Vec<u64> = (0..10).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, [1, 2, 4, 8, 16, 32, 64, 128, 256, 300]);
        assert_eq!(backoff.next_delay(), Backoff::MAX);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn invalidate_all_wire_format() {
        let value = serde_json::to_value(AdminMessage::InvalidateAll).unwrap();
        assert_eq!(value, json!({ "type": "InvalidateAll" }));
    }

    #[tokio::test]
    async fn resubscribe_notice_clears_every_listener() {
        let bus = LocalBus::default();
        let (a, b) = (NodeId::new(), NodeId::new());
        let (entries_a, entries_b) = (entries(), entries());
        InvalidationListener::new(a, &entries_a).spawn(bus.subscribe());
        InvalidationListener::new(b, &entries_b).spawn(bus.subscribe());
        entries_a.insert("c1".into(), Connector::new("c1"));
        entries_b.insert("c2".into(), Connector::new("c2"));

        bus.publish(&resubscribe_notice()).await.unwrap();
        settle().await;

        assert!(entries_a.is_empty());
        assert!(entries_b.is_empty());
    }

    #[tokio::test]
    async fn invalidate_all_applies_even_from_own_node() {
        let bus = LocalBus::default();
        let node = NodeId::new();
        let entries = entries();
        InvalidationListener::new(node, &entries).spawn(bus.subscribe());
        entries.insert("c1".into(), Connector::new("c1"));

        bus.publish(&AdminEnvelope {
            source: node,
            message: AdminMessage::InvalidateAll,
        })
        .await
        .unwrap();
        settle().await;

        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn listener_stops_when_bus_closes() {
        let bus = LocalBus::default();
        let entries = entries();
        let task = InvalidationListener::new(NodeId::new(), &entries).spawn(bus.subscribe());

        drop(bus);
        task.await.unwrap();
    }
}
