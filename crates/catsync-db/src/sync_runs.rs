//! Database operations for `sync_runs`.
//!
//! Lifecycle: `queued → running → succeeded | failed | rejected`. A run is
//! `rejected` when its partition was already being reconciled.

use std::fmt;

use catsync_core::{ImportSummary, ProductTypeId};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const SYNC_RUN_COLUMNS: &str = "id, public_id, product_type, trigger_source, status, \
    payload_sha256, categories_created, categories_updated, categories_deleted, \
    products_created, products_updated, products_deleted, error_kind, error_message, \
    started_at, completed_at, created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Cli,
    Scheduler,
}

impl TriggerSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerSource::Cli => "cli",
            TriggerSource::Scheduler => "scheduler",
        }
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row from the `sync_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub product_type: i16,
    pub trigger_source: String,
    pub status: String,
    /// Hex SHA-256 of the fetched feed; `NULL` if the fetch never completed.
    pub payload_sha256: Option<String>,
    pub categories_created: i32,
    pub categories_updated: i32,
    pub categories_deleted: i32,
    pub products_created: i32,
    pub products_updated: i32,
    pub products_deleted: i32,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Creates a new sync run in `queued` status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_sync_run(
    pool: &PgPool,
    product_type: ProductTypeId,
    trigger_source: TriggerSource,
) -> Result<SyncRunRow, DbError> {
    let sql = format!(
        "INSERT INTO sync_runs (public_id, product_type, trigger_source, status) \
         VALUES ($1, $2, $3, 'queued') \
         RETURNING {SYNC_RUN_COLUMNS}"
    );
    let row = sqlx::query_as::<_, SyncRunRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(product_type.get())
        .bind(trigger_source.as_str())
        .fetch_one(pool)
        .await?;

    Ok(row)
}

/// Marks a run as `running` and sets `started_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::InvalidSyncRunTransition`] if the run is not `queued`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn start_sync_run(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE sync_runs \
         SET status = 'running', started_at = NOW() \
         WHERE id = $1 AND status = 'queued'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    ensure_transition(result.rows_affected(), id, "queued")
}

/// Stores the digest of the fetched payload on a running run.
///
/// # Errors
///
/// Returns [`DbError::InvalidSyncRunTransition`] if the run is not `running`.
pub async fn record_payload_digest(pool: &PgPool, id: i64, sha256: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE sync_runs SET payload_sha256 = $1 WHERE id = $2 AND status = 'running'",
    )
    .bind(sha256)
    .bind(id)
    .execute(pool)
    .await?;

    ensure_transition(result.rows_affected(), id, "running")
}

/// Marks a run as `succeeded` with the per-kind counts of `summary`.
///
/// # Errors
///
/// Returns [`DbError::InvalidSyncRunTransition`] if the run is not `running`.
pub async fn complete_sync_run(
    pool: &PgPool,
    id: i64,
    summary: &ImportSummary,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE sync_runs SET \
             status = 'succeeded', completed_at = NOW(), \
             categories_created = $1, categories_updated = $2, categories_deleted = $3, \
             products_created = $4, products_updated = $5, products_deleted = $6 \
         WHERE id = $7 AND status = 'running'",
    )
    .bind(count(summary.categories.created))
    .bind(count(summary.categories.updated))
    .bind(count(summary.categories.deleted))
    .bind(count(summary.products.created))
    .bind(count(summary.products.updated))
    .bind(count(summary.products.deleted))
    .bind(id)
    .execute(pool)
    .await?;

    ensure_transition(result.rows_affected(), id, "running")
}

/// Marks a run as `failed`, recording the error kind and message.
///
/// # Errors
///
/// Returns [`DbError::InvalidSyncRunTransition`] if the run is not `running`.
pub async fn fail_sync_run(
    pool: &PgPool,
    id: i64,
    error_kind: &str,
    error_message: &str,
) -> Result<(), DbError> {
    finish_unsuccessfully(pool, id, "failed", error_kind, error_message).await
}

/// Marks a run as `rejected` because its partition was busy.
///
/// # Errors
///
/// Returns [`DbError::InvalidSyncRunTransition`] if the run is not `running`.
pub async fn reject_sync_run(pool: &PgPool, id: i64, error_message: &str) -> Result<(), DbError> {
    finish_unsuccessfully(pool, id, "rejected", "busy", error_message).await
}

async fn finish_unsuccessfully(
    pool: &PgPool,
    id: i64,
    status: &str,
    error_kind: &str,
    error_message: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE sync_runs \
         SET status = $1, completed_at = NOW(), error_kind = $2, error_message = $3 \
         WHERE id = $4 AND status = 'running'",
    )
    .bind(status)
    .bind(error_kind)
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await?;

    ensure_transition(result.rows_affected(), id, "running")
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no run has `public_id`.
pub async fn get_sync_run(pool: &PgPool, public_id: Uuid) -> Result<SyncRunRow, DbError> {
    let sql = format!("SELECT {SYNC_RUN_COLUMNS} FROM sync_runs WHERE public_id = $1");
    sqlx::query_as::<_, SyncRunRow>(&sql)
        .bind(public_id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Most recent runs first, optionally for one product type.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_sync_runs(
    pool: &PgPool,
    product_type: Option<ProductTypeId>,
    limit: i64,
) -> Result<Vec<SyncRunRow>, DbError> {
    let sql = format!(
        "SELECT {SYNC_RUN_COLUMNS} FROM sync_runs \
         WHERE ($1::SMALLINT IS NULL OR product_type = $1) \
         ORDER BY created_at DESC, id DESC \
         LIMIT $2"
    );
    let rows = sqlx::query_as::<_, SyncRunRow>(&sql)
        .bind(product_type.map(ProductTypeId::get))
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

fn ensure_transition(affected: u64, id: i64, expected_status: &'static str) -> Result<(), DbError> {
    if affected == 0 {
        return Err(DbError::InvalidSyncRunTransition {
            id,
            expected_status,
        });
    }
    Ok(())
}

fn count(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
