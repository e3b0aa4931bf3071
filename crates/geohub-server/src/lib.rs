pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod observability;
pub mod service;
pub mod storage_adapter;

pub use bootstrap::{BootstrapError, BootstrapStats, CatalogSource, insert_local_connectors};
pub use cache::{CacheError, CacheSettings, ConnectorCache};
pub use config::AppConfig;
pub use observability::{init_tracing, shutdown_tracing};
pub use service::{BUILD_VERSION, HubService, ServiceBuilder, create_admin_bus};
pub use storage_adapter::{StorageBackendKind, create_connector_storage};
