//! PostgreSQL persistence for the catalog: the run-scoped store, the read
//! side, and the `sync_runs` history table.

pub mod reader;
mod records;
pub mod store;
pub mod sync_runs;

use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use catsync_core::AppConfig;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use thiserror::Error;

pub use reader::PgCatalogReader;
pub use store::{PgCatalogStore, PgTransaction};
pub use sync_runs::{
    complete_sync_run, create_sync_run, fail_sync_run, get_sync_run, list_sync_runs,
    record_payload_digest, reject_sync_run, start_sync_run, SyncRunRow, TriggerSource,
};

/// Shown in `pg_stat_activity` so operators can tell sync sessions apart.
const APPLICATION_NAME: &str = "catsync";

// Relative to crates/catsync-db/Cargo.toml.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections.min(config.db_max_connections),
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error("sync run {id} is not in expected status '{expected_status}'")]
    InvalidSyncRunTransition {
        id: i64,
        expected_status: &'static str,
    },
    #[error("stored row is invalid: {0}")]
    InvalidRow(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Opens a pool tagged with the catsync application name.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the URL is malformed or no connection can be
/// established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    let options = PgConnectOptions::from_str(database_url)?.application_name(APPLICATION_NAME);
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect_with(options)
        .await?;

    tracing::debug!(
        max_connections = config.max_connections,
        "database pool ready"
    );
    Ok(pool)
}

/// Applies pending migrations and returns how many were new.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    let before = applied_versions(pool).await;
    MIGRATOR.run(pool).await?;

    let pending = MIGRATOR
        .iter()
        .filter(|m| !m.migration_type.is_down_migration() && !before.contains(&m.version))
        .count();
    tracing::info!(applied = pending, "migrations up to date");
    Ok(pending)
}

/// Versions already recorded; empty on a database that was never migrated.
async fn applied_versions(pool: &PgPool) -> HashSet<i64> {
    sqlx::query_scalar::<_, i64>("SELECT version FROM _sqlx_migrations WHERE success = true")
        .fetch_all(pool)
        .await
        .map(|versions| versions.into_iter().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_embedded_in_order() {
        let versions: Vec<i64> = MIGRATOR.iter().map(|m| m.version).collect();
        assert!(versions.len() >= 2);
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
    }
}
