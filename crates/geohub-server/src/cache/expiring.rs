//! Concurrent map whose entries expire a fixed time after insertion.

use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// Sharded map with a per-map TTL measured from insertion.
///
/// Reads never refresh the deadline. Expired entries are dropped lazily when
/// read and eagerly by [`ExpiringMap::purge_expired`], which
/// [`ExpiringMap::spawn_reaper`] runs on an interval. Time comes from the tokio
/// clock.
#[derive(Debug)]
pub struct ExpiringMap<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, Entry<V>>,
    ttl: Duration,
}

impl<K, V> ExpiringMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_live(&self, entry: &Entry<V>, now: Instant) -> bool {
        now.saturating_duration_since(entry.inserted_at) < self.ttl
    }

    /// Inserts or replaces `key`, restarting its TTL.
    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Returns a clone of the value if present and not expired.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        match self.entries.get(key) {
            None => return None,
            Some(entry) if self.is_live(&entry, now) => return Some(entry.value.clone()),
            Some(_) => {}
        }
        // The shard guard is released above; a concurrent insert may have
        // refreshed the entry, so only drop it if it is still stale.
        self.entries.remove_if(key, |_, entry| !self.is_live(entry, now));
        None
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| self.is_live(entry, now));
        before.saturating_sub(self.entries.len())
    }
}

impl<K, V> ExpiringMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Purges expired entries every `interval` until the map is dropped.
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let map = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(map) = map.upgrade() else {
                    break;
                };
                let purged = map.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, remaining = map.len(), "purged expired cache entries");
                }
            }
        })
    }
}
