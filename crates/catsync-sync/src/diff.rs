//! Pure diffing of a mapped import against a persisted snapshot.
//!
//! Entities are matched by external id within one partition. Output order is
//! fully determined by the inputs: categories by path (creates and updates
//! shallowest first, deletes deepest first), products by external id.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use catsync_core::{
    CatalogParseResult, Category, CategoryChanges, CategoryUpdate, MappedCategory, MappedProduct,
    PriceEntry, Product, ProductChanges, ProductUpdate, ReconciliationPlan,
};

/// Computes category creates, updates and soft-deletes.
///
/// `persisted` is expected to hold live rows only; a soft-deleted category
/// that reappears is reported as a create and revived by the store.
#[must_use]
pub fn diff_categories(imported: &[MappedCategory], persisted: &[Category]) -> CategoryChanges {
    let by_external: HashMap<&str, &Category> = persisted
        .iter()
        .map(|c| (c.external_id.as_str(), c))
        .collect();
    let imported_ids: HashSet<&str> = imported.iter().map(|c| c.external_id.as_str()).collect();

    let mut changes = CategoryChanges::default();
    for category in imported {
        match by_external.get(category.external_id.as_str()) {
            None => changes.creates.push(category.clone()),
            Some(existing) if category_differs(category, existing) => {
                changes.updates.push(CategoryUpdate {
                    id: existing.id,
                    category: category.clone(),
                });
            }
            Some(_) => {}
        }
    }
    changes.deletes = persisted
        .iter()
        .filter(|c| !imported_ids.contains(c.external_id.as_str()))
        .cloned()
        .collect();

    changes
        .creates
        .sort_by(|a, b| (a.path.depth(), &a.path).cmp(&(b.path.depth(), &b.path)));
    changes.updates.sort_by(|a, b| {
        (a.category.path.depth(), &a.category.path).cmp(&(b.category.path.depth(), &b.category.path))
    });
    changes
        .deletes
        .sort_by_key(|c| Reverse((c.path.depth(), c.path.clone())));

    changes
}

/// Computes product creates, updates and soft-deletes.
#[must_use]
pub fn diff_products(imported: &[MappedProduct], persisted: &[Product]) -> ProductChanges {
    let by_external: HashMap<&str, &Product> = persisted
        .iter()
        .map(|p| (p.external_id.as_str(), p))
        .collect();
    let imported_ids: HashSet<&str> = imported.iter().map(|p| p.external_id.as_str()).collect();

    let mut changes = ProductChanges::default();
    for product in imported {
        match by_external.get(product.external_id.as_str()) {
            None => changes.creates.push(product.clone()),
            Some(existing) if product_differs(product, existing) => {
                changes.updates.push(ProductUpdate {
                    id: existing.id,
                    product: product.clone(),
                });
            }
            Some(_) => {}
        }
    }
    changes.deletes = persisted
        .iter()
        .filter(|p| !imported_ids.contains(p.external_id.as_str()))
        .cloned()
        .collect();

    changes
        .creates
        .sort_by(|a, b| a.external_id.cmp(&b.external_id));
    changes
        .updates
        .sort_by(|a, b| a.product.external_id.cmp(&b.product.external_id));
    changes
        .deletes
        .sort_by(|a, b| a.external_id.cmp(&b.external_id));

    changes
}

/// Full plan for one partition.
#[must_use]
pub fn plan_changes(
    import: &CatalogParseResult,
    categories: &[Category],
    products: &[Product],
) -> ReconciliationPlan {
    ReconciliationPlan {
        product_type: import.product_type,
        categories: diff_categories(&import.categories, categories),
        products: diff_products(&import.products, products),
    }
}

fn category_differs(imported: &MappedCategory, existing: &Category) -> bool {
    imported.name != existing.name
        || imported.slug != existing.slug
        || imported.path != existing.path
        || imported.product_type != existing.product_type
}

fn product_differs(imported: &MappedProduct, existing: &Product) -> bool {
    imported.name != existing.name
        || imported.slug != existing.slug
        || imported.category_external_id != existing.category_external_id
        || imported.product_type != existing.product_type
        || imported.manufacturer != existing.manufacturer
        || imported.stock != existing.stock
        || imported.photo != existing.photo
        || imported.scheme != existing.scheme
        || imported.is_sale != existing.is_sale
        || imported.is_new != existing.is_new
        || imported.pack_quantity != existing.pack_quantity
        || !same_prices(&imported.prices, &existing.prices)
}

/// Order-insensitive; amounts compare numerically.
fn same_prices(imported: &[PriceEntry], existing: &[PriceEntry]) -> bool {
    if imported.len() != existing.len() {
        return false;
    }
    let mut a: Vec<&PriceEntry> = imported.iter().collect();
    let mut b: Vec<&PriceEntry> = existing.iter().collect();
    a.sort_by_key(|p| p.price_type);
    b.sort_by_key(|p| p.price_type);
    a == b
}

#[cfg(test)]
#[path = "diff_test.rs"]
mod tests;
