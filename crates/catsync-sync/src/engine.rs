//! The reconciliation run: load → diff → apply → summarize, one store
//! transaction per run and at most one run per partition.

use std::sync::Arc;
use std::time::Instant;

use catsync_core::{
    CatalogParseResult, CatalogStore, CatalogTransaction, Category, FeedFormat, ImportSummary,
    NotificationSink, Product, ProductTypeId, ReconciliationPlan,
};
use catsync_feed::{parse_feed, CatalogMapper};
use tokio_util::sync::CancellationToken;

use crate::diff::plan_changes;
use crate::error::{EntityKind, ReconciliationError};
use crate::locks::{PartitionGuard, PartitionLocks};

pub struct ReconciliationEngine<S> {
    store: S,
    mapper: CatalogMapper,
    locks: PartitionLocks,
    notifier: Option<Arc<dyn NotificationSink>>,
}

impl<S: CatalogStore> ReconciliationEngine<S> {
    pub fn new(store: S, mapper: CatalogMapper) -> Self {
        Self {
            store,
            mapper,
            locks: PartitionLocks::new(),
            notifier: None,
        }
    }

    /// Summaries of runs that changed something are sent here after commit.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Shares partition locks with other engines in the same process.
    #[must_use]
    pub fn with_locks(mut self, locks: PartitionLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn locks(&self) -> &PartitionLocks {
        &self.locks
    }

    /// Parses and maps a raw feed. Pure; touches no state.
    ///
    /// # Errors
    ///
    /// Returns [`ReconciliationError::Feed`] or [`ReconciliationError::Mapping`].
    pub fn prepare(
        &self,
        bytes: &[u8],
        product_type: ProductTypeId,
        format: Option<FeedFormat>,
    ) -> Result<CatalogParseResult, ReconciliationError> {
        let parsed = parse_feed(bytes, product_type, format)?;
        Ok(self.mapper.map(&parsed)?)
    }

    /// The trigger surface: feed bytes in, summary or typed error out.
    ///
    /// # Errors
    ///
    /// Any [`ReconciliationError`]; see [`Self::reconcile_with_cancel`].
    pub async fn sync_feed(
        &self,
        bytes: &[u8],
        product_type: ProductTypeId,
        format: Option<FeedFormat>,
        cancel: &CancellationToken,
    ) -> Result<ImportSummary, ReconciliationError> {
        let import = self.prepare(bytes, product_type, format)?;
        self.reconcile_with_cancel(&import, product_type, cancel)
            .await
    }

    /// # Errors
    ///
    /// See [`Self::reconcile_with_cancel`].
    pub async fn reconcile(
        &self,
        import: &CatalogParseResult,
        product_type: ProductTypeId,
    ) -> Result<ImportSummary, ReconciliationError> {
        self.reconcile_with_cancel(import, product_type, &CancellationToken::new())
            .await
    }

    /// Applies `import` as the complete desired state of `product_type`.
    ///
    /// Cancellation is honoured up to the start of the apply phase; after
    /// that the run finishes as a unit.
    ///
    /// # Errors
    ///
    /// - [`ReconciliationError::RunInProgress`] if the partition is locked.
    /// - [`ReconciliationError::EmptyImport`] if the import would empty a
    ///   populated partition.
    /// - [`ReconciliationError::Cancelled`] if `cancel` fired before apply.
    /// - [`ReconciliationError::Persistence`] if any store call fails; all
    ///   writes of the run are rolled back.
    pub async fn reconcile_with_cancel(
        &self,
        import: &CatalogParseResult,
        product_type: ProductTypeId,
        cancel: &CancellationToken,
    ) -> Result<ImportSummary, ReconciliationError> {
        let started = Instant::now();
        let _guard = self.claim(import, product_type)?;
        if cancel.is_cancelled() {
            return Err(ReconciliationError::Cancelled { product_type });
        }

        tracing::info!(
            %product_type,
            categories = import.categories.len(),
            products = import.products.len(),
            "reconciliation started"
        );

        let mut tx = self.store.begin(product_type).await?;
        let plan = match load_plan(&mut tx, import).await {
            Ok(plan) => plan,
            Err(err) => {
                rollback_quietly(tx, product_type).await;
                return Err(err);
            }
        };

        if cancel.is_cancelled() {
            rollback_quietly(tx, product_type).await;
            tracing::info!(%product_type, "reconciliation cancelled before apply");
            return Err(ReconciliationError::Cancelled { product_type });
        }

        let summary = plan.summary();
        if plan.is_empty() {
            rollback_quietly(tx, product_type).await;
            tracing::info!(%product_type, "reconciliation found no changes");
            return Ok(summary);
        }

        if let Err(err) = tx.apply_category_changes(&plan.categories).await {
            rollback_quietly(tx, product_type).await;
            tracing::warn!(%product_type, error = %err, "category apply failed, run rolled back");
            return Err(err.into());
        }
        if let Err(err) = tx.apply_product_changes(&plan.products).await {
            rollback_quietly(tx, product_type).await;
            tracing::warn!(%product_type, error = %err, "product apply failed, run rolled back");
            return Err(err.into());
        }
        tx.commit().await.map_err(|err| {
            tracing::warn!(%product_type, error = %err, "commit failed, run rolled back");
            ReconciliationError::from(err)
        })?;

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            %product_type,
            categories_created = summary.categories.created,
            categories_updated = summary.categories.updated,
            categories_deleted = summary.categories.deleted,
            products_created = summary.products.created,
            products_updated = summary.products.updated,
            products_deleted = summary.products.deleted,
            elapsed_ms,
            "reconciliation committed"
        );

        self.notify(&summary).await;
        Ok(summary)
    }

    /// Dry run: computes the plan against current state and writes nothing.
    ///
    /// # Errors
    ///
    /// Same as [`Self::reconcile`] minus apply-phase failures.
    pub async fn plan(
        &self,
        import: &CatalogParseResult,
        product_type: ProductTypeId,
    ) -> Result<ReconciliationPlan, ReconciliationError> {
        let _guard = self.claim(import, product_type)?;
        let mut tx = self.store.begin(product_type).await?;
        let plan = load_plan(&mut tx, import).await;
        rollback_quietly(tx, product_type).await;
        plan
    }

    fn claim(
        &self,
        import: &CatalogParseResult,
        product_type: ProductTypeId,
    ) -> Result<PartitionGuard, ReconciliationError> {
        if import.product_type != product_type {
            return Err(ReconciliationError::PartitionMismatch {
                expected: product_type,
                found: import.product_type,
            });
        }
        self.locks.try_acquire(product_type).ok_or_else(|| {
            tracing::warn!(%product_type, "reconciliation rejected, partition busy");
            ReconciliationError::RunInProgress { product_type }
        })
    }

    async fn notify(&self, summary: &ImportSummary) {
        if summary.is_noop() {
            return;
        }
        let Some(notifier) = &self.notifier else {
            return;
        };
        if let Err(err) = notifier.notify(&summary.to_string()).await {
            tracing::warn!(
                product_type = %summary.product_type,
                error = %err,
                "failed to deliver sync notification"
            );
        }
    }
}

async fn load_plan<T: CatalogTransaction>(
    tx: &mut T,
    import: &CatalogParseResult,
) -> Result<ReconciliationPlan, ReconciliationError> {
    let categories = tx.load_categories().await?;
    let products = tx.load_products().await?;
    guard_empty_import(import, &categories, &products)?;
    Ok(plan_changes(import, &categories, &products))
}

/// Refuses to soft-delete a whole entity kind because the feed came back
/// empty for it.
fn guard_empty_import(
    import: &CatalogParseResult,
    categories: &[Category],
    products: &[Product],
) -> Result<(), ReconciliationError> {
    let product_type = import.product_type;
    if import.categories.is_empty() && !categories.is_empty() {
        return Err(ReconciliationError::EmptyImport {
            product_type,
            entity: EntityKind::Categories,
            persisted: categories.len(),
        });
    }
    if import.products.is_empty() && !products.is_empty() {
        return Err(ReconciliationError::EmptyImport {
            product_type,
            entity: EntityKind::Products,
            persisted: products.len(),
        });
    }
    Ok(())
}

async fn rollback_quietly<T: CatalogTransaction>(tx: T, product_type: ProductTypeId) {
    if let Err(err) = tx.rollback().await {
        tracing::warn!(%product_type, error = %err, "rollback failed");
    }
}
