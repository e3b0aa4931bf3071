//! PostgreSQL implementation of `ConnectorStorage`.

use async_trait::async_trait;
use geohub_core::{Connector, Marker};
use geohub_storage::{ConnectorStorage, StorageError, validate_connector};
use serde_json::Value;
use sqlx_postgres::PgPool;
use tracing::{debug, info, instrument};

use crate::config::PostgresConfig;
use crate::error::PostgresError;
use crate::queries::connectors;
use crate::{migrations, pool};

/// Connector store backed by the `connectors` table.
///
/// The pool is created lazily; [`ConnectorStorage::init`] opens the first
/// connection and applies migrations.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
    run_migrations: bool,
}

impl PostgresStorage {
    /// Creates a storage for the given configuration without connecting.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL or pool settings are invalid.
    pub fn new(config: &PostgresConfig) -> Result<Self, StorageError> {
        let pool = pool::create_pool(config)?;
        Ok(Self {
            pool,
            run_migrations: config.run_migrations,
        })
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Number of stored connectors.
    pub async fn count(&self) -> Result<i64, StorageError> {
        Ok(connectors::count(&self.pool).await?)
    }
}

fn decode(id: &str, document: Value) -> Result<Connector, PostgresError> {
    Connector::from_json(document).map_err(|e| PostgresError::CorruptRow {
        id: id.to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl ConnectorStorage for PostgresStorage {
    #[instrument(skip(self))]
    async fn init(&self) -> Result<(), StorageError> {
        pool::ping(&self.pool).await?;
        if self.run_migrations {
            migrations::run(&self.pool).await?;
        }
        info!("PostgreSQL connector store ready");
        Ok(())
    }

    #[instrument(skip(self, marker), fields(marker = %marker))]
    async fn get_connector(&self, marker: &Marker, id: &str) -> Result<Connector, StorageError> {
        let row = connectors::fetch(&self.pool, id)
            .await?
            .ok_or_else(|| StorageError::not_found(id))?;

        debug!(updated_at = %row.updated_at, "connector loaded");
        Ok(decode(&row.id, row.config)?)
    }

    #[instrument(skip(self, marker, connector), fields(marker = %marker, connector_id = ?connector.id()))]
    async fn store_connector(
        &self,
        marker: &Marker,
        connector: &Connector,
    ) -> Result<Connector, StorageError> {
        let id = validate_connector(connector)?;
        let document = connector.to_json()?;
        let stored = connectors::upsert(&self.pool, id, &document).await?;
        Ok(decode(id, stored)?)
    }

    #[instrument(skip(self, marker), fields(marker = %marker))]
    async fn delete_connector(
        &self,
        marker: &Marker,
        id: &str,
    ) -> Result<Connector, StorageError> {
        match connectors::delete(&self.pool, id).await? {
            Some(document) => Ok(decode(id, document)?),
            None => Err(StorageError::not_found(id)),
        }
    }

    #[instrument(skip(self, marker), fields(marker = %marker))]
    async fn get_all_connectors(&self, marker: &Marker) -> Result<Vec<Connector>, StorageError> {
        let rows = connectors::list(&self.pool).await?;
        let mut all = Vec::with_capacity(rows.len());
        for (id, document) in rows {
            all.push(decode(&id, document)?);
        }
        debug!(count = all.len(), "listed connectors");
        Ok(all)
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_reports_the_offending_row() {
        let err = decode("broken", json!({ "remoteFunction": { "env": {} } })).unwrap_err();
        assert!(matches!(err, PostgresError::CorruptRow { ref id, .. } if id == "broken"));

        let storage_err: StorageError = err.into();
        assert!(matches!(storage_err, StorageError::Internal { .. }));
    }

    #[test]
    fn decode_accepts_stored_documents() {
        let connector = decode("psql", json!({ "id": "psql", "owner": "ANONYMOUS" })).unwrap();
        assert_eq!(connector.id(), Some("psql"));
        assert_eq!(connector.extra["owner"], "ANONYMOUS");
    }
}
