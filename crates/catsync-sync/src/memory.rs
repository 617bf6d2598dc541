//! In-memory catalog store.
//!
//! Implements the same contract as the Postgres store: one transaction per
//! run with snapshot isolation per partition, at most one open transaction
//! per partition, soft-delete revival on re-create, and nothing visible
//! before commit. Failure points can be armed to exercise rollback paths.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use catsync_core::{
    sort_rows, CatalogReader, CatalogStore, CatalogTransaction, Category, CategoryChanges,
    CategoryLocations, MappedCategory, MappedProduct, Pagination, PriceTypeCode, Product,
    ProductChanges, ProductFilter, ProductRow, ProductSort, ProductTypeId, StoreError,
};
use chrono::Utc;
use tokio::sync::RwLock;

/// Where an armed failure fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    ApplyCategories,
    ApplyProducts,
    Commit,
}

#[derive(Debug, Default)]
struct CatalogState {
    categories: BTreeMap<i64, Category>,
    products: BTreeMap<i64, Product>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    state: Arc<RwLock<CatalogState>>,
    next_id: Arc<AtomicI64>,
    open: Arc<Mutex<HashSet<ProductTypeId>>>,
    fail_point: Arc<Mutex<Option<FailPoint>>>,
}

impl MemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms (or with `None`, disarms) a failure for subsequent transactions.
    pub fn fail_at(&self, point: Option<FailPoint>) {
        *self.fail_point.lock().unwrap_or_else(PoisonError::into_inner) = point;
    }

    /// Every committed category of a partition, soft-deleted rows included.
    pub async fn all_categories(&self, product_type: ProductTypeId) -> Vec<Category> {
        let state = self.state.read().await;
        state
            .categories
            .values()
            .filter(|c| c.product_type == product_type)
            .cloned()
            .collect()
    }

    /// Every committed product of a partition, soft-deleted rows included.
    pub async fn all_products(&self, product_type: ProductTypeId) -> Vec<Product> {
        let state = self.state.read().await;
        state
            .products
            .values()
            .filter(|p| p.product_type == product_type)
            .cloned()
            .collect()
    }

    fn check_fail_point(&self, point: FailPoint) -> Result<(), StoreError> {
        let armed = *self.fail_point.lock().unwrap_or_else(PoisonError::into_inner);
        if armed == Some(point) {
            return Err(StoreError::backend(std::io::Error::other(format!(
                "injected failure at {point:?}"
            ))));
        }
        Ok(())
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn release(&self, product_type: ProductTypeId) {
        self.open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&product_type);
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    type Transaction = MemoryTransaction;

    async fn begin(&self, product_type: ProductTypeId) -> Result<MemoryTransaction, StoreError> {
        if !self
            .open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(product_type)
        {
            return Err(StoreError::PartitionBusy { product_type });
        }

        let state = self.state.read().await;
        let categories = state
            .categories
            .iter()
            .filter(|(_, c)| c.product_type == product_type)
            .map(|(id, c)| (*id, c.clone()))
            .collect();
        let products = state
            .products
            .iter()
            .filter(|(_, p)| p.product_type == product_type)
            .map(|(id, p)| (*id, p.clone()))
            .collect();

        Ok(MemoryTransaction {
            catalog: self.clone(),
            product_type,
            categories,
            products,
        })
    }
}

/// Working copy of one partition. Dropping it discards every write.
#[derive(Debug)]
pub struct MemoryTransaction {
    catalog: MemoryCatalog,
    product_type: ProductTypeId,
    categories: BTreeMap<i64, Category>,
    products: BTreeMap<i64, Product>,
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.catalog.release(self.product_type);
    }
}

impl MemoryTransaction {
    fn write_category(&mut self, id: Option<i64>, mapped: &MappedCategory) -> Result<(), StoreError> {
        let now = Utc::now();
        let revived = self
            .categories
            .values()
            .find(|c| c.external_id == mapped.external_id)
            .map(|c| c.id);

        let id = match id.or(revived) {
            Some(id) => id,
            None => {
                let id = self.catalog.allocate_id();
                self.categories.insert(
                    id,
                    Category {
                        id,
                        external_id: mapped.external_id.clone(),
                        name: mapped.name.clone(),
                        slug: mapped.slug.clone(),
                        path: mapped.path.clone(),
                        product_type: self.product_type,
                        is_deleted: false,
                        created_at: now,
                        updated_at: now,
                    },
                );
                return Ok(());
            }
        };

        let row = self
            .categories
            .get_mut(&id)
            .ok_or_else(|| StoreError::Integrity(format!("category {id} does not exist")))?;
        row.name.clone_from(&mapped.name);
        row.slug.clone_from(&mapped.slug);
        row.path = mapped.path.clone();
        row.is_deleted = false;
        row.updated_at = now;
        Ok(())
    }

    fn write_product(&mut self, id: Option<i64>, mapped: &MappedProduct) -> Result<(), StoreError> {
        let now = Utc::now();
        let category_id = self
            .categories
            .values()
            .find(|c| !c.is_deleted && c.external_id == mapped.category_external_id)
            .map(|c| c.id)
            .ok_or_else(|| {
                StoreError::Integrity(format!(
                    "product {} references missing category {}",
                    mapped.external_id, mapped.category_external_id
                ))
            })?;
        let revived = self
            .products
            .values()
            .find(|p| p.external_id == mapped.external_id)
            .map(|p| p.id);

        let id = match id.or(revived) {
            Some(id) => id,
            None => self.catalog.allocate_id(),
        };
        let created_at = self.products.get(&id).map_or(now, |p| p.created_at);

        self.products.insert(
            id,
            Product {
                id,
                external_id: mapped.external_id.clone(),
                name: mapped.name.clone(),
                slug: mapped.slug.clone(),
                category_id,
                category_external_id: mapped.category_external_id.clone(),
                product_type: self.product_type,
                manufacturer: mapped.manufacturer.clone(),
                stock: mapped.stock,
                photo: mapped.photo.clone(),
                scheme: mapped.scheme.clone(),
                is_sale: mapped.is_sale,
                is_new: mapped.is_new,
                pack_quantity: mapped.pack_quantity,
                prices: mapped.prices.clone(),
                is_deleted: false,
                created_at,
                updated_at: now,
            },
        );
        Ok(())
    }

    /// Every live product must point at a live category.
    fn check_integrity(&self) -> Result<(), StoreError> {
        for product in self.products.values().filter(|p| !p.is_deleted) {
            let live = self
                .categories
                .get(&product.category_id)
                .is_some_and(|c| !c.is_deleted);
            if !live {
                return Err(StoreError::Integrity(format!(
                    "product {} references deleted category {}",
                    product.external_id, product.category_external_id
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogTransaction for MemoryTransaction {
    async fn load_categories(&mut self) -> Result<Vec<Category>, StoreError> {
        let mut live: Vec<Category> = self
            .categories
            .values()
            .filter(|c| !c.is_deleted)
            .cloned()
            .collect();
        live.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(live)
    }

    async fn load_products(&mut self) -> Result<Vec<Product>, StoreError> {
        Ok(self
            .products
            .values()
            .filter(|p| !p.is_deleted)
            .cloned()
            .collect())
    }

    async fn apply_category_changes(
        &mut self,
        changes: &CategoryChanges,
    ) -> Result<(), StoreError> {
        self.catalog.check_fail_point(FailPoint::ApplyCategories)?;

        for mapped in &changes.creates {
            self.write_category(None, mapped)?;
        }
        for update in &changes.updates {
            self.write_category(Some(update.id), &update.category)?;
        }
        let now = Utc::now();
        for deleted in &changes.deletes {
            let row = self.categories.get_mut(&deleted.id).ok_or_else(|| {
                StoreError::Integrity(format!("category {} does not exist", deleted.id))
            })?;
            row.is_deleted = true;
            row.updated_at = now;
        }
        Ok(())
    }

    async fn apply_product_changes(&mut self, changes: &ProductChanges) -> Result<(), StoreError> {
        self.catalog.check_fail_point(FailPoint::ApplyProducts)?;

        for mapped in &changes.creates {
            self.write_product(None, mapped)?;
        }
        for update in &changes.updates {
            self.write_product(Some(update.id), &update.product)?;
        }
        let now = Utc::now();
        for deleted in &changes.deletes {
            let row = self.products.get_mut(&deleted.id).ok_or_else(|| {
                StoreError::Integrity(format!("product {} does not exist", deleted.id))
            })?;
            row.is_deleted = true;
            row.updated_at = now;
        }
        Ok(())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        self.catalog.check_fail_point(FailPoint::Commit)?;
        self.check_integrity()?;

        let product_type = self.product_type;
        let categories = std::mem::take(&mut self.categories);
        let products = std::mem::take(&mut self.products);

        let mut state = self.catalog.state.write().await;
        state.categories.retain(|_, c| c.product_type != product_type);
        state.products.retain(|_, p| p.product_type != product_type);
        state.categories.extend(categories);
        state.products.extend(products);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}

fn category_paths(state: &CatalogState) -> CategoryLocations {
    state
        .categories
        .values()
        .map(|c| (c.id, (c.product_type, c.path.clone())))
        .collect()
}

#[async_trait]
impl CatalogReader for MemoryCatalog {
    async fn count_products(&self, filter: &ProductFilter) -> Result<u64, StoreError> {
        let state = self.state.read().await;
        let paths = category_paths(&state);
        let count = state
            .products
            .values()
            .filter(|p| filter.matches(p, &paths))
            .count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        pagination: Pagination,
        sort: ProductSort,
        price_type: PriceTypeCode,
    ) -> Result<Vec<ProductRow>, StoreError> {
        let state = self.state.read().await;
        let paths = category_paths(&state);
        let mut rows: Vec<ProductRow> = state
            .products
            .values()
            .filter(|p| filter.matches(p, &paths))
            .map(|p| ProductRow::from_product(p, price_type))
            .collect();
        sort_rows(&mut rows, sort);
        Ok(pagination.slice(rows))
    }

    async fn get_product(
        &self,
        id: i64,
        price_type: PriceTypeCode,
    ) -> Result<Option<ProductRow>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .products
            .get(&id)
            .filter(|p| !p.is_deleted)
            .map(|p| ProductRow::from_product(p, price_type)))
    }

    async fn list_categories(
        &self,
        product_type: Option<ProductTypeId>,
    ) -> Result<Vec<Category>, StoreError> {
        let state = self.state.read().await;
        let mut live: Vec<Category> = state
            .categories
            .values()
            .filter(|c| !c.is_deleted && product_type.is_none_or(|pt| c.product_type == pt))
            .cloned()
            .collect();
        live.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.name.cmp(&b.name)));
        Ok(live)
    }
}
