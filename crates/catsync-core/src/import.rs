//! Ephemeral import-side types: raw feed records, mapped rows, and the
//! per-run summary.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::{PriceEntry, ProductTypeId};
use crate::path::CategoryPath;

/// Wire format of an ERP export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedFormat {
    Xml,
    Json,
}

impl fmt::Display for FeedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedFormat::Xml => write!(f, "xml"),
            FeedFormat::Json => write!(f, "json"),
        }
    }
}

/// A price exactly as the feed states it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPrice {
    pub amount: String,
    pub currency: Option<String>,
}

/// One category or product record from the feed, before mapping.
///
/// For categories `parent_external_id` is the parent category; for products
/// it is the owning category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub external_id: String,
    pub name: String,
    pub parent_external_id: Option<String>,
    /// Keyed by the raw price-type code string.
    pub prices: BTreeMap<String, RawPrice>,
    pub stock: i32,
    pub manufacturer: Option<String>,
    pub photo: Option<String>,
    pub scheme: Option<String>,
    pub is_sale: bool,
    pub is_new: bool,
    pub pack_quantity: Option<i32>,
}

/// Parser output for one feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFeed {
    pub product_type: ProductTypeId,
    pub categories: Vec<ImportRecord>,
    pub products: Vec<ImportRecord>,
}

impl ParsedFeed {
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.categories.len() + self.products.len()
    }
}

/// A category normalized for storage; not yet assigned an internal id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedCategory {
    pub external_id: String,
    pub name: String,
    pub slug: String,
    pub path: CategoryPath,
    pub product_type: ProductTypeId,
}

/// A product normalized for storage.
///
/// `category_external_id` is guaranteed to name a category of the same
/// [`CatalogParseResult`]; the store resolves it to an internal id when the
/// run is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedProduct {
    pub external_id: String,
    pub name: String,
    pub slug: String,
    pub category_external_id: String,
    pub category_path: CategoryPath,
    pub product_type: ProductTypeId,
    pub manufacturer: Option<String>,
    pub stock: i32,
    pub photo: Option<String>,
    pub scheme: Option<String>,
    pub is_sale: bool,
    pub is_new: bool,
    pub pack_quantity: i32,
    /// Sorted by price type; one entry per code.
    pub prices: Vec<PriceEntry>,
}

/// Mapper output: the complete desired state of one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogParseResult {
    pub product_type: ProductTypeId,
    pub categories: Vec<MappedCategory>,
    pub products: Vec<MappedProduct>,
}

impl CatalogParseResult {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.products.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationCounts {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl OperationCounts {
    #[must_use]
    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

impl fmt::Display for OperationCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} deleted",
            self.created, self.updated, self.deleted
        )
    }
}

/// Result of a committed reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub product_type: ProductTypeId,
    pub categories: OperationCounts,
    pub products: OperationCounts,
}

impl ImportSummary {
    #[must_use]
    pub fn empty(product_type: ProductTypeId) -> Self {
        Self {
            product_type,
            categories: OperationCounts::default(),
            products: OperationCounts::default(),
        }
    }

    /// `true` when the run changed nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.categories.total() == 0 && self.products.total() == 0
    }
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "catalog sync for product type {}: categories {}; products {}",
            self.product_type, self.categories, self.products
        )
    }
}
