//! Redis connection settings and pool construction.

use std::time::Duration;

use deadpool_redis::{Pool, Runtime};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::RedisStoreError;

/// Connection settings shared by the key-value store and the admin bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,

    /// Connection pool size
    pub pool_size: usize,

    /// Timeout for waiting on, creating and recycling connections, in milliseconds
    pub timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            timeout_ms: 5000,
        }
    }
}

impl RedisConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Builds a connection pool. No connection is opened until first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed.
    pub fn create_pool(&self) -> Result<Pool, RedisStoreError> {
        let mut redis_config = deadpool_redis::Config::from_url(&self.url);
        let timeout = Some(Duration::from_millis(self.timeout_ms));
        let mut pool_config = redis_config.get_pool_config();
        pool_config.max_size = self.pool_size;
        pool_config.timeouts.wait = timeout;
        pool_config.timeouts.create = timeout;
        pool_config.timeouts.recycle = timeout;
        redis_config.pool = Some(pool_config);

        let pool = redis_config.create_pool(Some(Runtime::Tokio1))?;
        info!(pool_size = self.pool_size, "Created Redis connection pool");
        Ok(pool)
    }
}
