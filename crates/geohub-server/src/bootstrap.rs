//! Inserts the bundled connector catalog at startup.

use std::path::{Path, PathBuf};

use geohub_core::{Connector, Marker, PlaceholderTable};
use tracing::{info, instrument};

use crate::cache::ConnectorCache;

/// Connector catalog compiled into the binary.
pub const BUNDLED_CATALOG: &str = include_str!("../resources/connectors.json");

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("failed to read connector catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed connector catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Where the catalog is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    Bundled,
    File(PathBuf),
}

impl CatalogSource {
    pub fn from_path(path: Option<&Path>) -> Self {
        path.map_or(Self::Bundled, |p| Self::File(p.to_path_buf()))
    }

    pub async fn load(&self) -> Result<Vec<Connector>, BootstrapError> {
        match self {
            Self::Bundled => parse_catalog(BUNDLED_CATALOG),
            Self::File(path) => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| BootstrapError::Io {
                        path: path.clone(),
                        source,
                    })?;
                parse_catalog(&raw)
            }
        }
    }
}

pub fn parse_catalog(raw: &str) -> Result<Vec<Connector>, BootstrapError> {
    Ok(serde_json::from_str(raw)?)
}

/// Outcome of one bootstrap run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapStats {
    pub inserted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BootstrapStats {
    /// Returns the total number of catalog records processed.
    pub fn total(&self) -> usize {
        self.inserted + self.skipped + self.failed
    }
}

/// Resolves placeholders in every catalog record and stores the ones that do
/// not exist yet.
///
/// Existing connectors are left untouched and no invalidation is published.
/// A failing record is logged and counted; it does not stop the run.
#[instrument(skip_all)]
pub async fn insert_local_connectors(
    cache: &ConnectorCache,
    placeholders: &PlaceholderTable,
    source: &CatalogSource,
) -> Result<BootstrapStats, BootstrapError> {
    let catalog = source.load().await?;
    info!(records = catalog.len(), ?source, "Inserting local connectors");

    let marker = Marker::system("bootstrap");
    let mut stats = BootstrapStats::default();

    for mut connector in catalog {
        let replaced = placeholders.resolve(&mut connector);
        let id = connector.id.clone();

        match cache.store_if_not_exists(&marker, connector).await {
            Ok(stored) => {
                stats.inserted += 1;
                info!(connector_id = ?stored.id(), placeholders = replaced, "Inserted local connector");
            }
            Err(e) if e.is_already_exists() => {
                stats.skipped += 1;
                info!(connector_id = ?id, "Local connector already exists, skipping");
            }
            Err(e) => {
                stats.failed += 1;
                info!(connector_id = ?id, error = %e, "Failed to insert local connector");
            }
        }
    }

    info!(
        inserted = stats.inserted,
        skipped = stats.skipped,
        failed = stats.failed,
        "Local connector bootstrap completed"
    );

    Ok(stats)
}
