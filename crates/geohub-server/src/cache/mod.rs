//! Connector caching.
//!
//! - [`expiring`]: TTL map holding this node's cached connectors
//! - [`pubsub`]: admin bus carrying invalidations between nodes
//! - [`gate`]: one-shot initialization gate
//! - [`connector`]: the [`ConnectorCache`] facade tying them to a store

pub mod connector;
pub mod expiring;
pub mod gate;
pub mod pubsub;

pub use connector::{CacheError, CacheSettings, ConnectorCache};
pub use expiring::ExpiringMap;
pub use gate::InitGate;
pub use pubsub::{
    AdminBus, AdminEnvelope, AdminMessage, BusError, DynAdminBus, InvalidationBroadcaster,
    InvalidationListener, LocalBus, NodeId, RedisBus,
};
