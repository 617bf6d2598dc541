//! Ports the synchronization core consumes: the persistence gateway, the
//! read side, and the notification sink.

use async_trait::async_trait;
use thiserror::Error;

use crate::catalog::{Category, PriceTypeCode, Product, ProductTypeId};
use crate::plan::{CategoryChanges, ProductChanges};
use crate::query::{Pagination, ProductFilter, ProductRow, ProductSort};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("product type {product_type} is locked by another reconciliation run")]
    PartitionBusy { product_type: ProductTypeId },

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }
}

/// Opens one transaction per reconciliation run.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    type Transaction: CatalogTransaction;

    /// Starts a run transaction scoped to `product_type`.
    ///
    /// Implementations that can detect a concurrent run on the same partition
    /// return [`StoreError::PartitionBusy`].
    async fn begin(&self, product_type: ProductTypeId) -> Result<Self::Transaction, StoreError>;
}

/// All reads and writes of one run. Nothing is visible to other readers
/// until [`CatalogTransaction::commit`]; dropping the transaction without
/// committing discards every write.
#[async_trait]
pub trait CatalogTransaction: Send {
    /// Live (not soft-deleted) categories of the run's partition.
    async fn load_categories(&mut self) -> Result<Vec<Category>, StoreError>;

    /// Live products of the run's partition, prices included.
    async fn load_products(&mut self) -> Result<Vec<Product>, StoreError>;

    /// Writes creates, then updates, then soft-deletes in the given order
    /// (deepest path first).
    async fn apply_category_changes(&mut self, changes: &CategoryChanges)
        -> Result<(), StoreError>;

    /// Writes creates, updates and soft-deletes. Category references are
    /// resolved against the categories as they stand after
    /// [`CatalogTransaction::apply_category_changes`].
    async fn apply_product_changes(&mut self, changes: &ProductChanges) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// Read-only access for query use cases.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    async fn count_products(&self, filter: &ProductFilter) -> Result<u64, StoreError>;

    async fn list_products(
        &self,
        filter: &ProductFilter,
        pagination: Pagination,
        sort: ProductSort,
        price_type: PriceTypeCode,
    ) -> Result<Vec<ProductRow>, StoreError>;

    async fn get_product(
        &self,
        id: i64,
        price_type: PriceTypeCode,
    ) -> Result<Option<ProductRow>, StoreError>;

    /// Live categories, optionally restricted to one partition.
    async fn list_categories(
        &self,
        product_type: Option<ProductTypeId>,
    ) -> Result<Vec<Category>, StoreError>;
}

#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Outbound channel for run summaries (chat, alerting). Best effort.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, text: &str) -> Result<(), NotifyError>;
}
