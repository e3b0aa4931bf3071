// Tracing initialization with a configurable output format and reloadable log level.
use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

use crate::config::{LogFormat, LoggingConfig};

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, tracing_subscriber::Registry>> =
    OnceLock::new();

pub fn init_tracing() {
    init_tracing_with(&LoggingConfig::default());
}

pub fn init_tracing_with(logging: &LoggingConfig) {
    // Prefer RUST_LOG from env, otherwise use the configured level.
    let base_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(&logging.level));

    let (reload_layer, handle) = reload::Layer::new(base_filter);
    let _ = LOG_RELOAD_HANDLE.set(handle);

    let (text, json) = match logging.format {
        LogFormat::Text => (Some(fmt::layer()), None),
        LogFormat::Json => (None, Some(fmt::layer().json().with_current_span(true))),
    };

    let _ = tracing_subscriber::registry()
        .with(reload_layer)
        .with(text)
        .with(json)
        .try_init();
}

/// Apply a new logging level at runtime. Returns `false` when tracing was not
/// initialized through this module.
pub fn apply_logging_level(level: &str) -> bool {
    match LOG_RELOAD_HANDLE.get() {
        Some(handle) => handle
            .modify(|f| {
                *f = EnvFilter::new(level);
            })
            .is_ok(),
        None => false,
    }
}

pub fn shutdown_tracing() {
    tracing::info!("geohub-server shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_can_be_reloaded_after_init() {
        init_tracing_with(&LoggingConfig {
            level: "warn".into(),
            format: LogFormat::Json,
        });
        assert!(apply_logging_level("debug"));
    }
}
