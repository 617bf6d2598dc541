//! Recurring synchronisation of every configured feed.
//!
//! Each tick reconciles all partitions concurrently. A tick that overlaps a
//! still-running one is rejected per partition by the engine's run lock and
//! recorded as a `rejected` run.

use std::sync::Arc;

use catsync_core::{load_feed_sources, AppConfig, FeedSourceConfig};
use catsync_db::TriggerSource;
use futures::stream::{self, StreamExt};
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tokio_util::sync::CancellationToken;

use crate::sync::{sync_partition, FeedSource, SyncContext};

pub(crate) async fn run(pool: PgPool, config: AppConfig) -> anyhow::Result<()> {
    let feeds = load_feed_sources(&config.feeds_path)?.feeds;
    if feeds.is_empty() {
        anyhow::bail!(
            "no feeds configured in {}; nothing to schedule",
            config.feeds_path.display()
        );
    }

    let ctx = Arc::new(SyncContext::new(pool, &config)?);
    let shutdown = CancellationToken::new();
    let mut scheduler =
        build_scheduler(ctx, Arc::new(feeds), &config.sync_cron, shutdown.clone()).await?;

    crate::shutdown_signal().await;
    shutdown.cancel();
    scheduler.shutdown().await?;
    Ok(())
}

/// Builds and starts the scheduler with the catalog sync job registered.
///
/// The returned handle must be kept alive; dropping it stops the job.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if `cron` is invalid or the scheduler fails
/// to start.
async fn build_scheduler(
    ctx: Arc<SyncContext>,
    feeds: Arc<Vec<FeedSourceConfig>>,
    cron: &str,
    shutdown: CancellationToken,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let ctx = Arc::clone(&ctx);
        let feeds = Arc::clone(&feeds);
        let shutdown = shutdown.clone();

        Box::pin(async move {
            tracing::info!(feeds = feeds.len(), "scheduler: starting catalog sync");
            run_all_feeds(&ctx, &feeds, &shutdown).await;
            tracing::info!("scheduler: catalog sync complete");
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron = %cron, "scheduler: registered catalog sync job");
    scheduler.start().await?;
    Ok(scheduler)
}

async fn run_all_feeds(ctx: &SyncContext, feeds: &[FeedSourceConfig], shutdown: &CancellationToken) {
    if shutdown.is_cancelled() {
        return;
    }

    let tasks: Vec<_> = feeds
        .iter()
        .map(|feed| async move {
            let source = FeedSource::Url(feed.url.clone());
            let outcome = sync_partition(
                ctx,
                feed.product_type,
                &source,
                feed.format,
                TriggerSource::Scheduler,
                shutdown,
            )
            .await;
            (feed, outcome)
        })
        .collect();

    let results: Vec<_> = stream::iter(tasks)
        .buffer_unordered(feeds.len().max(1))
        .collect()
        .await;

    let mut failed = 0_usize;
    for (feed, outcome) in &results {
        match outcome {
            Ok(summary) => tracing::info!(feed = %feed.name, %summary, "scheduler: feed synchronised"),
            Err(e) => {
                failed += 1;
                tracing::error!(
                    feed = %feed.name,
                    product_type = %feed.product_type,
                    error = %format!("{e:#}"),
                    "scheduler: feed sync failed"
                );
            }
        }
    }

    if failed > 0 {
        tracing::warn!(failed, total = feeds.len(), "scheduler: some feeds failed");
    }
}
