//! Connector store over a single Redis hash.
//!
//! The hash is named by the configured table identifier. Each field is a
//! connector id and each value the connector serialized as JSON.

use std::collections::HashMap;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool};
use geohub_core::{Connector, Marker};
use geohub_storage::{ConnectorStorage, StorageError, validate_connector};
use redis::AsyncCommands;
use tracing::{debug, info, instrument};

use crate::error::RedisStoreError;

#[derive(Clone)]
pub struct RedisHashStorage {
    pool: Pool,
    table: String,
}

impl RedisHashStorage {
    pub fn new(pool: Pool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }

    /// Name of the backing hash.
    pub fn table(&self) -> &str {
        &self.table
    }

    async fn connection(&self) -> Result<Connection, RedisStoreError> {
        Ok(self.pool.get().await?)
    }

    fn decode(&self, id: &str, raw: &str) -> Result<Connector, RedisStoreError> {
        serde_json::from_str(raw).map_err(|e| RedisStoreError::CorruptValue {
            table: self.table.clone(),
            id: id.to_string(),
            message: e.to_string(),
        })
    }

    fn encode(&self, id: &str, connector: &Connector) -> Result<String, RedisStoreError> {
        serde_json::to_string(connector).map_err(|e| RedisStoreError::CorruptValue {
            table: self.table.clone(),
            id: id.to_string(),
            message: e.to_string(),
        })
    }
}

impl std::fmt::Debug for RedisHashStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisHashStorage")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ConnectorStorage for RedisHashStorage {
    #[instrument(skip(self), fields(table = %self.table))]
    async fn init(&self) -> Result<(), StorageError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(RedisStoreError::from)?;
        info!("Redis connector store ready");
        Ok(())
    }

    #[instrument(skip(self, marker), fields(marker = %marker, table = %self.table))]
    async fn get_connector(&self, marker: &Marker, id: &str) -> Result<Connector, StorageError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .hget(&self.table, id)
            .await
            .map_err(RedisStoreError::from)?;

        match raw {
            Some(raw) => Ok(self.decode(id, &raw)?),
            None => Err(StorageError::not_found(id)),
        }
    }

    #[instrument(skip(self, marker, connector), fields(marker = %marker, table = %self.table, connector_id = ?connector.id()))]
    async fn store_connector(
        &self,
        marker: &Marker,
        connector: &Connector,
    ) -> Result<Connector, StorageError> {
        let id = validate_connector(connector)?;
        let raw = self.encode(id, connector)?;

        let mut conn = self.connection().await?;
        let _: () = conn
            .hset(&self.table, id, &raw)
            .await
            .map_err(RedisStoreError::from)?;

        debug!("connector written");
        Ok(connector.clone())
    }

    #[instrument(skip(self, marker), fields(marker = %marker, table = %self.table))]
    async fn delete_connector(
        &self,
        marker: &Marker,
        id: &str,
    ) -> Result<Connector, StorageError> {
        let mut conn = self.connection().await?;
        let (raw, _removed): (Option<String>, i64) = redis::pipe()
            .atomic()
            .hget(&self.table, id)
            .hdel(&self.table, id)
            .query_async(&mut conn)
            .await
            .map_err(RedisStoreError::from)?;

        match raw {
            Some(raw) => Ok(self.decode(id, &raw)?),
            None => Err(StorageError::not_found(id)),
        }
    }

    #[instrument(skip(self, marker), fields(marker = %marker, table = %self.table))]
    async fn get_all_connectors(&self, marker: &Marker) -> Result<Vec<Connector>, StorageError> {
        let mut conn = self.connection().await?;
        let entries: HashMap<String, String> = conn
            .hgetall(&self.table)
            .await
            .map_err(RedisStoreError::from)?;

        let mut all = entries
            .iter()
            .map(|(id, raw)| self.decode(id, raw))
            .collect::<Result<Vec<_>, _>>()?;
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
