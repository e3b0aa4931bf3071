use std::path::PathBuf;
use std::time::Duration;

use geohub_core::{PSQL_HOST, PlaceholderTable};
use serde::{Deserialize, Serialize};

use crate::cache::CacheSettings;
use crate::cache::pubsub::DEFAULT_CHANNEL;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub redis: RedisSettings,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub node: NodeConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Storage validations
        if self.storage.pool_size == 0 {
            return Err("storage.pool_size must be > 0".into());
        }
        if self.storage.connect_timeout_ms == 0 {
            return Err("storage.connect_timeout_ms must be > 0".into());
        }
        if self.storage.keyvalue_table().is_some() && self.redis.url().is_none() {
            return Err("storage.connectors_keyvalue_table requires redis.url".into());
        }
        // Redis validations
        if self.redis.pool_size == 0 {
            return Err("redis.pool_size must be > 0".into());
        }
        // Bus validations
        if self.bus.kind == BusKind::Redis && self.redis.url().is_none() {
            return Err("bus.kind = \"redis\" requires redis.url".into());
        }
        if self.bus.channel.trim().is_empty() {
            return Err("bus.channel must not be empty".into());
        }
        // Cache validations
        if self.cache.connector_ttl_secs == 0 {
            return Err("cache.connector_ttl_secs must be > 0".into());
        }
        if self.cache.reaper_interval_secs == 0 {
            return Err("cache.reaper_interval_secs must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    /// Host-level placeholder values for bundled connectors.
    pub fn placeholders(&self) -> PlaceholderTable {
        let mut table = PlaceholderTable::new();
        if let Some(host) = self.bootstrap.psql_host.as_deref().filter(|h| !h.is_empty()) {
            table.insert(PSQL_HOST, host);
        }
        table
    }

    /// Applies the flat host variables (`PSQL_HOST`, `STORAGE_DB_URL`, ...)
    /// on top of the layered configuration. Empty values are ignored.
    pub fn apply_legacy_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(host) = get("PSQL_HOST") {
            self.bootstrap.psql_host = Some(host);
        }
        if let Some(flag) = get("INSERT_LOCAL_CONNECTORS") {
            self.bootstrap.insert_local_connectors = parse_flag(&flag);
        }
        if let Some(url) = get("STORAGE_DB_URL") {
            self.storage.db_url = Some(url);
        }
        if let Some(table) = get("CONNECTORS_KEYVALUE_TABLE") {
            self.storage.connectors_keyvalue_table = Some(table);
        }
        if let Some(host) = get("HOST_NAME") {
            self.node.host_name = Some(host);
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Relational store URL. The built-in default is used when absent.
    #[serde(default)]
    pub db_url: Option<String>,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Redis hash holding connectors; selects the key-value store.
    #[serde(default)]
    pub connectors_keyvalue_table: Option<String>,
    /// Keep connectors in process memory instead of an external store.
    #[serde(default)]
    pub in_memory: bool,
}

fn default_pool_size() -> u32 {
    10
}
fn default_connect_timeout_ms() -> u64 {
    5000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_url: None,
            pool_size: default_pool_size(),
            connect_timeout_ms: default_connect_timeout_ms(),
            connectors_keyvalue_table: None,
            in_memory: false,
        }
    }
}

impl StorageConfig {
    pub fn db_url(&self) -> Option<&str> {
        self.db_url.as_deref().filter(|u| !u.trim().is_empty())
    }

    pub fn keyvalue_table(&self) -> Option<&str> {
        self.connectors_keyvalue_table
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,
    /// Connection timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_pool_size() -> usize {
    10
}
fn default_redis_timeout_ms() -> u64 {
    5000
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

impl RedisSettings {
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().filter(|u| !u.trim().is_empty())
    }

    /// Connection settings, if a URL is configured.
    pub fn connection(&self) -> Option<geohub_db_redis::RedisConfig> {
        self.url().map(|url| geohub_db_redis::RedisConfig {
            url: url.to_string(),
            pool_size: self.pool_size,
            timeout_ms: self.timeout_ms,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    #[default]
    Local,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default)]
    pub kind: BusKind,
    #[serde(default = "default_bus_channel")]
    pub channel: String,
}

fn default_bus_channel() -> String {
    DEFAULT_CHANNEL.into()
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            kind: BusKind::default(),
            channel: default_bus_channel(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_connector_ttl_secs")]
    pub connector_ttl_secs: u64,
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,
}

fn default_connector_ttl_secs() -> u64 {
    180
}
fn default_reaper_interval_secs() -> u64 {
    30
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            connector_ttl_secs: default_connector_ttl_secs(),
            reaper_interval_secs: default_reaper_interval_secs(),
        }
    }
}

impl CacheConfig {
    pub fn settings(&self) -> CacheSettings {
        CacheSettings {
            ttl: Duration::from_secs(self.connector_ttl_secs),
            reaper_interval: Duration::from_secs(self.reaper_interval_secs),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Insert the bundled connectors at startup.
    #[serde(default)]
    pub insert_local_connectors: bool,
    /// Value for the `${PSQL_HOST}` placeholder.
    #[serde(default)]
    pub psql_host: Option<String>,
    /// Catalog file to use instead of the bundled one.
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Overrides the hostname reported at startup.
    #[serde(default)]
    pub host_name: Option<String>,
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file, read from the working directory.
    pub const DEFAULT_CONFIG_FILE: &str = "geohub.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        load_config_with_env(path, |name| std::env::var(name).ok())
    }

    /// Like [`load_config`], resolving the flat host variables through `lookup`.
    pub fn load_config_with_env(
        path: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., GEOHUB__CACHE__CONNECTOR_TTL_SECS=60
        builder = builder.add_source(
            Environment::with_prefix("GEOHUB")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let mut merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.apply_legacy_env(lookup);
        merged.validate()?;
        Ok(merged)
    }
}
