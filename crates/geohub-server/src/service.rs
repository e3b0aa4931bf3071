//! Service wiring: picks the store and the admin bus, owns the connector cache
//! and runs startup bootstrap.

use std::sync::{Arc, Mutex};

use anyhow::Context;
use geohub_storage::DynConnectorStorage;
use tokio::task::JoinHandle;

use crate::bootstrap::{BootstrapStats, CatalogSource, insert_local_connectors};
use crate::cache::{ConnectorCache, DynAdminBus, LocalBus, NodeId, RedisBus};
use crate::config::{AppConfig, BusKind};
use crate::storage_adapter::create_connector_storage;

/// Version reported at startup.
pub const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct HubService {
    config: AppConfig,
    node_id: NodeId,
    hostname: String,
    cache: ConnectorCache,
    background: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Default)]
pub struct ServiceBuilder {
    config: AppConfig,
    storage: Option<DynConnectorStorage>,
    bus: Option<DynAdminBus>,
}

impl ServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    /// Uses `storage` instead of the store selected by configuration.
    pub fn with_storage(mut self, storage: DynConnectorStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Uses `bus` instead of the bus selected by configuration.
    pub fn with_bus(mut self, bus: DynAdminBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn build(self) -> anyhow::Result<HubService> {
        let config = self.config;
        config.validate().map_err(anyhow::Error::msg)?;

        let node_id = NodeId::new();
        let hostname = resolve_hostname(&config);
        let mut background = Vec::new();

        let storage = match self.storage {
            Some(storage) => storage,
            None => create_connector_storage(&config).context("failed to configure connector store")?,
        };

        let bus = match self.bus {
            Some(bus) => bus,
            None => {
                let (bus, subscriber) = create_admin_bus(&config)?;
                background.extend(subscriber);
                bus
            }
        };

        let cache = ConnectorCache::new(node_id, storage, bus, config.cache.settings());

        Ok(HubService {
            config,
            node_id,
            hostname,
            cache,
            background: Mutex::new(background),
        })
    }
}

/// Builds the admin bus selected by `config`, plus the Redis subscriber task
/// when one is needed.
pub fn create_admin_bus(config: &AppConfig) -> anyhow::Result<(DynAdminBus, Option<JoinHandle<()>>)> {
    match config.bus.kind {
        BusKind::Local => Ok((Arc::new(LocalBus::default()), None)),
        BusKind::Redis => {
            let redis = config
                .redis
                .connection()
                .context("bus.kind = \"redis\" requires redis.url")?;
            let pool = redis.create_pool().context("failed to create admin bus pool")?;
            let bus = RedisBus::new(pool, redis.url, config.bus.channel.clone());
            let subscriber = bus.start();
            Ok((Arc::new(bus), Some(subscriber)))
        }
    }
}

fn resolve_hostname(config: &AppConfig) -> String {
    config
        .node
        .host_name
        .clone()
        .or_else(|| hostname::get().ok().map(|h| h.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unknown".to_string())
}

impl HubService {
    pub fn cache(&self) -> &ConnectorCache {
        &self.cache
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Initializes the cache and, when configured, inserts the bundled
    /// connectors.
    ///
    /// Bootstrap failures are logged and do not stop the service.
    pub async fn start(&self) -> anyhow::Result<Option<BootstrapStats>> {
        tracing::info!(
            version = BUILD_VERSION,
            node_id = %self.node_id,
            hostname = %self.hostname,
            "Starting geohub-server"
        );

        self.cache
            .init()
            .await
            .context("connector cache initialization failed")?;

        if !self.config.bootstrap.insert_local_connectors {
            return Ok(None);
        }

        let source = CatalogSource::from_path(self.config.bootstrap.catalog_path.as_deref());
        match insert_local_connectors(&self.cache, &self.config.placeholders(), &source).await {
            Ok(stats) => Ok(Some(stats)),
            Err(e) => {
                tracing::info!(error = %e, "Local connector bootstrap failed, continuing");
                Ok(None)
            }
        }
    }

    /// Starts the service and waits for Ctrl-C.
    pub async fn run(self) -> anyhow::Result<()> {
        self.start().await?;
        shutdown_signal().await;
        self.shutdown();
        Ok(())
    }

    /// Stops background tasks.
    pub fn shutdown(&self) {
        self.cache.shutdown();
        if let Ok(mut background) = self.background.lock() {
            for task in background.drain(..) {
                task.abort();
            }
        }
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.storage.in_memory = true;
        config
    }

    #[tokio::test]
    async fn starts_with_in_memory_store_and_local_bus() {
        let service = ServiceBuilder::new().with_config(memory_config()).build().unwrap();
        assert_eq!(service.cache().storage().backend_name(), "memory");

        assert_eq!(service.start().await.unwrap(), None);
        assert!(service.cache().is_ready());
        service.shutdown();
    }

    #[tokio::test]
    async fn host_name_override_wins() {
        let mut config = memory_config();
        config.node.host_name = Some("hub-7".into());
        let service = ServiceBuilder::new().with_config(config).build().unwrap();
        assert_eq!(service.hostname(), "hub-7");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = memory_config();
        config.cache.connector_ttl_secs = 0;
        assert!(ServiceBuilder::new().with_config(config).build().is_err());
    }
}
