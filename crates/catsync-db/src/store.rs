//! Postgres persistence gateway for reconciliation runs.
//!
//! Each run is one database transaction holding a transaction-scoped advisory
//! lock on its product type, so a second run on the same partition from any
//! process is rejected instead of interleaving writes.

use std::collections::HashMap;

use async_trait::async_trait;
use catsync_core::{
    CatalogStore, CatalogTransaction, Category, CategoryChanges, CategoryPath, MappedCategory,
    MappedProduct, PriceEntry, Product, ProductChanges, ProductTypeId, StoreError,
};
use sqlx::{PgPool, Postgres, Transaction};

use crate::records::{store_error, CategoryRecord, PriceRecord, ProductRecord};

/// First key of the two-key advisory lock; the second is the product type.
const PARTITION_LOCK_CLASS: i32 = 0x0C47_5C00;

#[derive(Debug, Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    type Transaction = PgTransaction;

    async fn begin(&self, product_type: ProductTypeId) -> Result<PgTransaction, StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_xact_lock($1, $2)")
            .bind(PARTITION_LOCK_CLASS)
            .bind(i32::from(product_type.get()))
            .fetch_one(&mut *tx)
            .await
            .map_err(store_error)?;
        if !locked {
            tx.rollback().await.map_err(store_error)?;
            return Err(StoreError::PartitionBusy { product_type });
        }

        tracing::debug!(%product_type, "partition transaction opened");
        Ok(PgTransaction { tx, product_type })
    }
}

pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
    product_type: ProductTypeId,
}

impl PgTransaction {
    fn partition(&self) -> i16 {
        self.product_type.get()
    }

    async fn upsert_category(&mut self, category: &MappedCategory) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO categories (product_type, external_id, name, slug, path, depth) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (product_type, external_id) DO UPDATE SET \
                 name       = EXCLUDED.name, \
                 slug       = EXCLUDED.slug, \
                 path       = EXCLUDED.path, \
                 depth      = EXCLUDED.depth, \
                 is_deleted = FALSE, \
                 updated_at = NOW()",
        )
        .bind(self.partition())
        .bind(&category.external_id)
        .bind(&category.name)
        .bind(&category.slug)
        .bind(category.path.to_string())
        .bind(depth(&category.path)?)
        .execute(&mut *self.tx)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn update_category(&mut self, id: i64, category: &MappedCategory) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE categories \
             SET name = $1, slug = $2, path = $3, depth = $4, is_deleted = FALSE, updated_at = NOW() \
             WHERE id = $5 AND product_type = $6",
        )
        .bind(&category.name)
        .bind(&category.slug)
        .bind(category.path.to_string())
        .bind(depth(&category.path)?)
        .bind(id)
        .bind(self.partition())
        .execute(&mut *self.tx)
        .await
        .map_err(store_error)?;
        expect_one_row(result.rows_affected(), "category", id)
    }

    async fn soft_delete(&mut self, table: Table, id: i64) -> Result<(), StoreError> {
        let sql = match table {
            Table::Categories => {
                "UPDATE categories SET is_deleted = TRUE, updated_at = NOW() \
                 WHERE id = $1 AND product_type = $2"
            }
            Table::Products => {
                "UPDATE products SET is_deleted = TRUE, updated_at = NOW() \
                 WHERE id = $1 AND product_type = $2"
            }
        };
        let result = sqlx::query(sql)
            .bind(id)
            .bind(self.partition())
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;
        expect_one_row(result.rows_affected(), table.noun(), id)
    }

    /// External id → internal id of every live category, as written so far in
    /// this transaction.
    async fn live_category_ids(&mut self) -> Result<HashMap<String, i64>, StoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT external_id, id FROM categories WHERE product_type = $1 AND NOT is_deleted",
        )
        .bind(self.partition())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(store_error)?;
        Ok(rows.into_iter().collect())
    }

    async fn write_product(
        &mut self,
        id: Option<i64>,
        product: &MappedProduct,
        category_ids: &HashMap<String, i64>,
    ) -> Result<(), StoreError> {
        let category_id = *category_ids
            .get(&product.category_external_id)
            .ok_or_else(|| {
                StoreError::Integrity(format!(
                    "product {} references missing category {}",
                    product.external_id, product.category_external_id
                ))
            })?;

        let product_id = match id {
            Some(id) => {
                self.update_product(id, category_id, product).await?;
                id
            }
            None => self.upsert_product(category_id, product).await?,
        };
        self.replace_prices(product_id, &product.prices).await
    }

    async fn upsert_product(
        &mut self,
        category_id: i64,
        product: &MappedProduct,
    ) -> Result<i64, StoreError> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO products \
                 (product_type, external_id, name, slug, category_id, manufacturer, stock, \
                  photo, scheme, is_sale, is_new, pack_quantity) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (product_type, external_id) DO UPDATE SET \
                 name          = EXCLUDED.name, \
                 slug          = EXCLUDED.slug, \
                 category_id   = EXCLUDED.category_id, \
                 manufacturer  = EXCLUDED.manufacturer, \
                 stock         = EXCLUDED.stock, \
                 photo         = EXCLUDED.photo, \
                 scheme        = EXCLUDED.scheme, \
                 is_sale       = EXCLUDED.is_sale, \
                 is_new        = EXCLUDED.is_new, \
                 pack_quantity = EXCLUDED.pack_quantity, \
                 is_deleted    = FALSE, \
                 updated_at    = NOW() \
             RETURNING id",
        )
        .bind(self.partition())
        .bind(&product.external_id)
        .bind(&product.name)
        .bind(&product.slug)
        .bind(category_id)
        .bind(&product.manufacturer)
        .bind(product.stock)
        .bind(&product.photo)
        .bind(&product.scheme)
        .bind(product.is_sale)
        .bind(product.is_new)
        .bind(product.pack_quantity)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(store_error)
    }

    async fn update_product(
        &mut self,
        id: i64,
        category_id: i64,
        product: &MappedProduct,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE products SET \
                 name = $1, slug = $2, category_id = $3, manufacturer = $4, stock = $5, \
                 photo = $6, scheme = $7, is_sale = $8, is_new = $9, pack_quantity = $10, \
                 is_deleted = FALSE, updated_at = NOW() \
             WHERE id = $11 AND product_type = $12",
        )
        .bind(&product.name)
        .bind(&product.slug)
        .bind(category_id)
        .bind(&product.manufacturer)
        .bind(product.stock)
        .bind(&product.photo)
        .bind(&product.scheme)
        .bind(product.is_sale)
        .bind(product.is_new)
        .bind(product.pack_quantity)
        .bind(id)
        .bind(self.partition())
        .execute(&mut *self.tx)
        .await
        .map_err(store_error)?;
        expect_one_row(result.rows_affected(), "product", id)
    }

    async fn replace_prices(
        &mut self,
        product_id: i64,
        prices: &[PriceEntry],
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM product_prices WHERE product_id = $1")
            .bind(product_id)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;

        for price in prices {
            sqlx::query(
                "INSERT INTO product_prices (product_id, price_type, amount, currency) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(product_id)
            .bind(price.price_type.get())
            .bind(price.amount)
            .bind(&price.currency)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;
        }
        Ok(())
    }

    /// Fails if a live product still points at a soft-deleted category.
    async fn check_integrity(&mut self) -> Result<(), StoreError> {
        let orphan: Option<(String, String)> = sqlx::query_as(
            "SELECT p.external_id, c.external_id \
             FROM products p \
             JOIN categories c ON c.id = p.category_id \
             WHERE p.product_type = $1 AND NOT p.is_deleted AND c.is_deleted \
             LIMIT 1",
        )
        .bind(self.partition())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(store_error)?;

        match orphan {
            Some((product, category)) => Err(StoreError::Integrity(format!(
                "product {product} references deleted category {category}"
            ))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CatalogTransaction for PgTransaction {
    async fn load_categories(&mut self) -> Result<Vec<Category>, StoreError> {
        let rows = sqlx::query_as::<_, CategoryRecord>(
            "SELECT id, external_id, name, slug, path, product_type, is_deleted, \
                    created_at, updated_at \
             FROM categories \
             WHERE product_type = $1 AND NOT is_deleted \
             ORDER BY depth, path",
        )
        .bind(self.partition())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(store_error)?;

        rows.into_iter().map(Category::try_from).collect()
    }

    async fn load_products(&mut self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query_as::<_, ProductRecord>(
            "SELECT p.id, p.external_id, p.name, p.slug, p.category_id, \
                    c.external_id AS category_external_id, p.product_type, p.manufacturer, \
                    p.stock, p.photo, p.scheme, p.is_sale, p.is_new, p.pack_quantity, \
                    p.is_deleted, p.created_at, p.updated_at \
             FROM products p \
             JOIN categories c ON c.id = p.category_id \
             WHERE p.product_type = $1 AND NOT p.is_deleted \
             ORDER BY p.external_id",
        )
        .bind(self.partition())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(store_error)?;

        let prices = sqlx::query_as::<_, PriceRecord>(
            "SELECT pp.product_id, pp.price_type, pp.amount, pp.currency \
             FROM product_prices pp \
             JOIN products p ON p.id = pp.product_id \
             WHERE p.product_type = $1 AND NOT p.is_deleted \
             ORDER BY pp.product_id, pp.price_type",
        )
        .bind(self.partition())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(store_error)?;

        let mut by_product: HashMap<i64, Vec<PriceEntry>> = HashMap::new();
        for price in prices {
            by_product
                .entry(price.product_id)
                .or_default()
                .push(price.into());
        }

        rows.into_iter()
            .map(|row| {
                let prices = by_product.remove(&row.id).unwrap_or_default();
                row.into_product(prices)
            })
            .collect()
    }

    async fn apply_category_changes(
        &mut self,
        changes: &CategoryChanges,
    ) -> Result<(), StoreError> {
        for category in &changes.creates {
            self.upsert_category(category).await?;
        }
        for update in &changes.updates {
            self.update_category(update.id, &update.category).await?;
        }
        for category in &changes.deletes {
            self.soft_delete(Table::Categories, category.id).await?;
        }
        tracing::debug!(
            product_type = %self.product_type,
            created = changes.creates.len(),
            updated = changes.updates.len(),
            deleted = changes.deletes.len(),
            "category changes written"
        );
        Ok(())
    }

    async fn apply_product_changes(&mut self, changes: &ProductChanges) -> Result<(), StoreError> {
        let category_ids = self.live_category_ids().await?;
        for product in &changes.creates {
            self.write_product(None, product, &category_ids).await?;
        }
        for update in &changes.updates {
            self.write_product(Some(update.id), &update.product, &category_ids)
                .await?;
        }
        for product in &changes.deletes {
            self.soft_delete(Table::Products, product.id).await?;
        }
        tracing::debug!(
            product_type = %self.product_type,
            created = changes.creates.len(),
            updated = changes.updates.len(),
            deleted = changes.deletes.len(),
            "product changes written"
        );
        Ok(())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        self.check_integrity().await?;
        self.tx.commit().await.map_err(store_error)
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(store_error)
    }
}

#[derive(Debug, Clone, Copy)]
enum Table {
    Categories,
    Products,
}

impl Table {
    fn noun(self) -> &'static str {
        match self {
            Table::Categories => "category",
            Table::Products => "product",
        }
    }
}

fn depth(path: &CategoryPath) -> Result<i16, StoreError> {
    i16::try_from(path.depth())
        .map_err(|_| StoreError::Integrity(format!("category path {path} is too deep")))
}

fn expect_one_row(affected: u64, noun: &str, id: i64) -> Result<(), StoreError> {
    if affected == 1 {
        Ok(())
    } else {
        Err(StoreError::Integrity(format!(
            "{noun} {id} does not exist in this partition"
        )))
    }
}
