//! Import and plan handlers, plus the fetch → reconcile → record pipeline the
//! scheduler shares.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use catsync_core::{
    load_feed_sources, AppConfig, FeedFormat, ImportSummary, NotificationSink, ProductTypeId,
    ReconciliationPlan,
};
use catsync_db::{PgCatalogStore, TriggerSource};
use catsync_feed::{CatalogMapper, FeedClient};
use catsync_sync::{
    ErrorKind, LogNotifier, PartitionLocks, ReconciliationEngine, ReconciliationError,
    WebhookNotifier,
};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::FeedArgs;

/// Where a feed payload comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FeedSource {
    File(PathBuf),
    Url(String),
}

/// Everything a reconciliation run needs, shared across scheduled ticks.
pub(crate) struct SyncContext {
    pool: PgPool,
    engine: ReconciliationEngine<PgCatalogStore>,
    client: FeedClient,
}

impl SyncContext {
    pub(crate) fn new(pool: PgPool, config: &AppConfig) -> anyhow::Result<Self> {
        let notifier: Arc<dyn NotificationSink> = match &config.notify_webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(
                url.clone(),
                config.feed_request_timeout_secs,
            )?),
            None => Arc::new(LogNotifier),
        };
        let engine = ReconciliationEngine::new(
            PgCatalogStore::new(pool.clone()),
            CatalogMapper::from_config(config),
        )
        .with_notifier(notifier);
        let client = FeedClient::from_config(config)?;
        Ok(Self {
            pool,
            engine,
            client,
        })
    }

    async fn load(&self, source: &FeedSource) -> anyhow::Result<Vec<u8>> {
        match source {
            FeedSource::File(path) => tokio::fs::read(path)
                .await
                .with_context(|| format!("failed to read feed file {}", path.display())),
            FeedSource::Url(url) => Ok(self.client.fetch(url).await?),
        }
    }
}

/// Picks the feed location and format: explicit flags win over the feeds file.
pub(crate) fn resolve_source(
    config: &AppConfig,
    args: &FeedArgs,
) -> anyhow::Result<(FeedSource, Option<FeedFormat>)> {
    let forced = args.format.map(FeedFormat::from);
    if let Some(path) = &args.file {
        return Ok((FeedSource::File(path.clone()), forced));
    }
    if let Some(url) = &args.url {
        return Ok((FeedSource::Url(url.clone()), forced));
    }

    let feeds = load_feed_sources(&config.feeds_path)?;
    let feed = feeds.find(args.product_type).with_context(|| {
        format!(
            "no feed configured for product type {} in {}",
            args.product_type,
            config.feeds_path.display()
        )
    })?;
    Ok((FeedSource::Url(feed.url.clone()), forced.or(feed.format)))
}

pub(crate) fn payload_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Loads, reconciles and records one partition as a `sync_runs` row.
///
/// # Errors
///
/// Returns an error if the run cannot be recorded, the feed cannot be
/// loaded, or reconciliation fails. Failures after the run starts are also
/// written to the run row.
pub(crate) async fn sync_partition(
    ctx: &SyncContext,
    product_type: ProductTypeId,
    source: &FeedSource,
    format: Option<FeedFormat>,
    trigger: TriggerSource,
    cancel: &CancellationToken,
) -> anyhow::Result<ImportSummary> {
    let pool = &ctx.pool;
    let run = catsync_db::create_sync_run(pool, product_type, trigger).await?;
    if let Err(e) = catsync_db::start_sync_run(pool, run.id).await {
        fail_run_best_effort(pool, run.id, "persistence_failure", format!("{e:#}")).await;
        return Err(e.into());
    }

    if let Err(busy) = ensure_partition_idle(ctx.engine.locks(), product_type) {
        reject_run_best_effort(pool, run.id, &busy.to_string()).await;
        return Err(busy.into());
    }

    let bytes = match ctx.load(source).await {
        Ok(bytes) => bytes,
        Err(e) => {
            fail_run_best_effort(pool, run.id, "fetch_failed", format!("{e:#}")).await;
            return Err(e);
        }
    };
    if let Err(e) = catsync_db::record_payload_digest(pool, run.id, &payload_digest(&bytes)).await
    {
        tracing::warn!(run_id = run.id, error = %e, "failed to record payload digest");
    }

    match ctx
        .engine
        .sync_feed(&bytes, product_type, format, cancel)
        .await
    {
        Ok(summary) => {
            catsync_db::complete_sync_run(pool, run.id, &summary).await?;
            Ok(summary)
        }
        Err(err) => {
            let message = err.to_string();
            if err.kind() == ErrorKind::Busy {
                reject_run_best_effort(pool, run.id, &message).await;
            } else {
                fail_run_best_effort(pool, run.id, err.kind().as_str(), message).await;
            }
            Err(err.into())
        }
    }
}

/// Skips the download when this process is already reconciling the
/// partition. The engine still claims the lock itself before writing.
fn ensure_partition_idle(
    locks: &PartitionLocks,
    product_type: ProductTypeId,
) -> Result<(), ReconciliationError> {
    if locks.is_held(product_type) {
        tracing::warn!(%product_type, "partition busy, skipping feed download");
        return Err(ReconciliationError::RunInProgress { product_type });
    }
    Ok(())
}

async fn reject_run_best_effort(pool: &PgPool, run_id: i64, message: &str) {
    if let Err(mark_err) = catsync_db::reject_sync_run(pool, run_id, message).await {
        tracing::error!(run_id, error = %mark_err, "failed to mark run as rejected");
    }
}

async fn fail_run_best_effort(pool: &PgPool, run_id: i64, error_kind: &str, message: String) {
    if let Err(mark_err) = catsync_db::fail_sync_run(pool, run_id, error_kind, &message).await {
        tracing::error!(
            run_id,
            error = %mark_err,
            "failed to mark sync run as failed"
        );
    }
}

/// Cancels `token` on Ctrl-C. Abort the returned handle once the run is done.
fn cancel_on_interrupt(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; cancelling before changes are applied");
            token.cancel();
        }
    })
}

pub(crate) async fn run_import(
    pool: &PgPool,
    config: &AppConfig,
    args: &FeedArgs,
) -> anyhow::Result<()> {
    let ctx = SyncContext::new(pool.clone(), config)?;
    let (source, format) = resolve_source(config, args)?;

    let cancel = CancellationToken::new();
    let interrupt = cancel_on_interrupt(cancel.clone());
    let result = sync_partition(
        &ctx,
        args.product_type,
        &source,
        format,
        TriggerSource::Cli,
        &cancel,
    )
    .await;
    interrupt.abort();

    let summary = result?;
    println!("{summary}");
    Ok(())
}

pub(crate) async fn run_plan(
    pool: &PgPool,
    config: &AppConfig,
    args: &FeedArgs,
) -> anyhow::Result<()> {
    let ctx = SyncContext::new(pool.clone(), config)?;
    let (source, format) = resolve_source(config, args)?;
    let bytes = ctx.load(&source).await?;

    let import = ctx.engine.prepare(&bytes, args.product_type, format)?;
    let plan = ctx.engine.plan(&import, args.product_type).await?;
    print!("{}", render_plan(&plan));
    Ok(())
}

fn render_plan(plan: &ReconciliationPlan) -> String {
    let counts = plan.counts();
    let mut out = format!("plan for product type {}\n", plan.product_type);

    out.push_str(&format!("  categories: {}\n", counts.categories));
    push_ids(&mut out, '+', &plan.category_creates());
    push_ids(&mut out, '~', &plan.category_updates());
    push_ids(&mut out, '-', &plan.category_deletes());

    out.push_str(&format!("  products: {}\n", counts.products));
    push_ids(&mut out, '+', &plan.product_creates());
    push_ids(&mut out, '~', &plan.product_updates());
    push_ids(&mut out, '-', &plan.product_deletes());

    if plan.is_empty() {
        out.push_str("  nothing to do\n");
    }
    out
}

fn push_ids(out: &mut String, marker: char, ids: &[&str]) {
    if !ids.is_empty() {
        out.push_str(&format!("    {marker} {}\n", ids.join(", ")));
    }
}
