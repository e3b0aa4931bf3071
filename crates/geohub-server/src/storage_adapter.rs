//! Chooses and builds the connector store for this process.

use std::sync::Arc;

use geohub_db_memory::InMemoryStorage;
use geohub_db_postgres::{DEFAULT_URL, PostgresConfig, PostgresStorage, mask_password};
use geohub_db_redis::RedisHashStorage;
use geohub_storage::{DynConnectorStorage, MigratingStorage, StorageError};

use crate::config::AppConfig;

/// Which store backs the connector cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackendKind {
    /// PostgreSQL `connectors` table.
    Relational { url: String },
    /// Redis hash named `table`.
    KeyValue { table: String },
    /// Both: reads prefer the hash, writes go to both.
    Migrating { table: String, url: String },
    /// Process memory.
    Memory,
}

impl StorageBackendKind {
    /// Picks the backend from the key-value table and relational URL signals.
    pub fn select(keyvalue_table: Option<&str>, db_url: Option<&str>) -> Self {
        match (keyvalue_table, db_url) {
            (Some(table), Some(url)) => Self::Migrating {
                table: table.to_string(),
                url: url.to_string(),
            },
            (Some(table), None) => Self::KeyValue {
                table: table.to_string(),
            },
            (None, url) => Self::Relational {
                url: url.unwrap_or(DEFAULT_URL).to_string(),
            },
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        if config.storage.in_memory {
            return Self::Memory;
        }
        Self::select(config.storage.keyvalue_table(), config.storage.db_url())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Relational { .. } => "relational",
            Self::KeyValue { .. } => "keyvalue",
            Self::Migrating { .. } => "migrating",
            Self::Memory => "memory",
        }
    }
}

/// Builds the store selected by `config`. No connection is made until the
/// store's `init` runs.
pub fn create_connector_storage(config: &AppConfig) -> Result<DynConnectorStorage, StorageError> {
    let kind = StorageBackendKind::from_config(config);
    match &kind {
        StorageBackendKind::Relational { url } | StorageBackendKind::Migrating { url, .. } => {
            tracing::info!(backend = kind.name(), url = %mask_password(url), "Configuring connector store");
        }
        _ => tracing::info!(backend = kind.name(), "Configuring connector store"),
    }

    Ok(match kind {
        StorageBackendKind::Relational { url } => Arc::new(relational(config, &url)?),
        StorageBackendKind::KeyValue { table } => Arc::new(key_value(config, &table)?),
        StorageBackendKind::Migrating { table, url } => Arc::new(MigratingStorage::new(
            Arc::new(key_value(config, &table)?),
            Arc::new(relational(config, &url)?),
        )),
        StorageBackendKind::Memory => Arc::new(InMemoryStorage::new()),
    })
}

fn relational(config: &AppConfig, url: &str) -> Result<PostgresStorage, StorageError> {
    let pg = PostgresConfig::new(url)
        .with_pool_size(config.storage.pool_size)
        .with_connect_timeout_ms(config.storage.connect_timeout_ms);
    PostgresStorage::new(&pg)
}

fn key_value(config: &AppConfig, table: &str) -> Result<RedisHashStorage, StorageError> {
    let redis = config
        .redis
        .connection()
        .ok_or_else(|| StorageError::internal("key-value connector store requires redis.url"))?;
    Ok(RedisHashStorage::new(redis.create_pool()?, table))
}
