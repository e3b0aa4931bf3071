//! Database migration management for the PostgreSQL connector store.
//!
//! Migrations are embedded in the binary so a deployment needs no SQL files
//! on disk.

use sqlx_core::migrate::{Migration, MigrationType, Migrator};
use sqlx_postgres::PgPool;
use std::borrow::Cow;
use tracing::{info, instrument};

use crate::error::{PostgresError, Result};

/// Embedded migrations in chronological order: (version, description, sql).
///
/// To add a migration, create the SQL file under `migrations/` and append an
/// entry here.
macro_rules! embedded_migrations {
    () => {
        &[(
            20240601000001i64,
            "connectors",
            include_str!("../../migrations/20240601000001_connectors.sql"),
        )]
    };
}

fn build_migrations() -> Vec<Migration> {
    embedded_migrations!()
        .iter()
        .map(|(version, description, sql)| Migration {
            version: *version,
            description: Cow::Borrowed(description),
            migration_type: MigrationType::Simple,
            sql: Cow::Borrowed(sql),
            checksum: Cow::Borrowed(&[]),
            no_tx: false,
        })
        .collect()
}

/// Number of migrations compiled into the binary.
pub fn embedded_count() -> usize {
    embedded_migrations!().len()
}

/// Runs all pending migrations, tracking them in `_sqlx_migrations`.
///
/// # Errors
///
/// Returns an error if a migration fails to execute.
#[instrument(skip(pool))]
pub async fn run(pool: &PgPool) -> Result<()> {
    let migrations = build_migrations();
    info!(count = migrations.len(), "Running connector store migrations");

    let migrator = Migrator {
        migrations: Cow::Owned(migrations),
        ignore_missing: false,
        locking: true,
        no_tx: false,
    };

    migrator
        .run(pool)
        .await
        .map_err(|e| PostgresError::Migration(e.to_string()))?;

    info!("Connector store migrations completed");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered_and_create_the_table() {
        let migrations = build_migrations();
        assert_eq!(migrations.len(), embedded_count());
        assert!(migrations.windows(2).all(|w| w[0].version < w[1].version));
        assert!(migrations[0].sql.contains("CREATE TABLE IF NOT EXISTS connectors"));
    }
}
