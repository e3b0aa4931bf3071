//! Row-level operations on the `connectors` table.
//!
//! Every function returns the `config` document as stored; turning it back
//! into a `Connector` is left to the caller.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::PgPool;

use crate::error::Result;

/// A stored document and its last write time.
#[derive(Debug, Clone)]
pub struct ConnectorRow {
    pub id: String,
    pub config: Value,
    pub updated_at: DateTime<Utc>,
}

pub async fn fetch(pool: &PgPool, id: &str) -> Result<Option<ConnectorRow>> {
    let row: Option<(String, Value, DateTime<Utc>)> =
        query_as("SELECT id, config, updated_at FROM connectors WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(|(id, config, updated_at)| ConnectorRow {
        id,
        config,
        updated_at,
    }))
}

/// Inserts or replaces the document for `id` and returns what was written.
pub async fn upsert(pool: &PgPool, id: &str, config: &Value) -> Result<Value> {
    let stored: Value = query_scalar(
        r#"INSERT INTO connectors (id, config)
           VALUES ($1, $2)
           ON CONFLICT (id) DO UPDATE SET config = EXCLUDED.config
           RETURNING config"#,
    )
    .bind(id)
    .bind(config)
    .fetch_one(pool)
    .await?;

    Ok(stored)
}

/// Deletes the row for `id`, returning its document if there was one.
pub async fn delete(pool: &PgPool, id: &str) -> Result<Option<Value>> {
    let deleted: Option<Value> = query_scalar("DELETE FROM connectors WHERE id = $1 RETURNING config")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(deleted)
}

pub async fn list(pool: &PgPool) -> Result<Vec<(String, Value)>> {
    let rows: Vec<(String, Value)> = query_as("SELECT id, config FROM connectors ORDER BY id")
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

pub async fn count(pool: &PgPool) -> Result<i64> {
    let total: i64 = query_scalar("SELECT COUNT(*) FROM connectors")
        .fetch_one(pool)
        .await?;
    Ok(total)
}
