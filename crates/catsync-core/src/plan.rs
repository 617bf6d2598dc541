//! Reconciliation plans: the create/update/soft-delete sets computed for one
//! partition, in the order the store must apply them.

use serde::Serialize;

use crate::catalog::{Category, Product, ProductTypeId};
use crate::import::{ImportSummary, MappedCategory, MappedProduct, OperationCounts};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryUpdate {
    pub id: i64,
    pub category: MappedCategory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductUpdate {
    pub id: i64,
    pub product: MappedProduct,
}

/// Category writes for one run.
///
/// `creates` are ordered shallowest path first so parents exist before their
/// children; `deletes` are ordered deepest path first so no parent is removed
/// while a child still references it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryChanges {
    pub creates: Vec<MappedCategory>,
    pub updates: Vec<CategoryUpdate>,
    pub deletes: Vec<Category>,
}

impl CategoryChanges {
    #[must_use]
    pub fn counts(&self) -> OperationCounts {
        OperationCounts {
            created: self.creates.len(),
            updated: self.updates.len(),
            deleted: self.deletes.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts().total() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProductChanges {
    pub creates: Vec<MappedProduct>,
    pub updates: Vec<ProductUpdate>,
    pub deletes: Vec<Product>,
}

impl ProductChanges {
    #[must_use]
    pub fn counts(&self) -> OperationCounts {
        OperationCounts {
            created: self.creates.len(),
            updated: self.updates.len(),
            deleted: self.deletes.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts().total() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanCounts {
    pub categories: OperationCounts,
    pub products: OperationCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationPlan {
    pub product_type: ProductTypeId,
    pub categories: CategoryChanges,
    pub products: ProductChanges,
}

impl ReconciliationPlan {
    #[must_use]
    pub fn counts(&self) -> PlanCounts {
        PlanCounts {
            categories: self.categories.counts(),
            products: self.products.counts(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.products.is_empty()
    }

    #[must_use]
    pub fn summary(&self) -> ImportSummary {
        let counts = self.counts();
        ImportSummary {
            product_type: self.product_type,
            categories: counts.categories,
            products: counts.products,
        }
    }

    /// External ids of categories to create, in apply order.
    #[must_use]
    pub fn category_creates(&self) -> Vec<&str> {
        self.categories
            .creates
            .iter()
            .map(|c| c.external_id.as_str())
            .collect()
    }

    #[must_use]
    pub fn category_updates(&self) -> Vec<&str> {
        self.categories
            .updates
            .iter()
            .map(|u| u.category.external_id.as_str())
            .collect()
    }

    /// External ids of categories to soft-delete, deepest first.
    #[must_use]
    pub fn category_deletes(&self) -> Vec<&str> {
        self.categories
            .deletes
            .iter()
            .map(|c| c.external_id.as_str())
            .collect()
    }

    #[must_use]
    pub fn product_creates(&self) -> Vec<&str> {
        self.products
            .creates
            .iter()
            .map(|p| p.external_id.as_str())
            .collect()
    }

    #[must_use]
    pub fn product_updates(&self) -> Vec<&str> {
        self.products
            .updates
            .iter()
            .map(|u| u.product.external_id.as_str())
            .collect()
    }

    #[must_use]
    pub fn product_deletes(&self) -> Vec<&str> {
        self.products
            .deletes
            .iter()
            .map(|p| p.external_id.as_str())
            .collect()
    }
}
