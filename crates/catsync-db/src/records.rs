//! Raw row shapes and their conversion into domain types.

use chrono::{DateTime, Utc};
use catsync_core::{
    Category, CategoryPath, PriceEntry, PriceTypeCode, Product, ProductRow, ProductTypeId,
    StoreError,
};
use rust_decimal::Decimal;

// Postgres SQLSTATE codes that indicate a violated constraint rather than a
// broken connection.
const FOREIGN_KEY_VIOLATION: &str = "23503";
const UNIQUE_VIOLATION: &str = "23505";
const CHECK_VIOLATION: &str = "23514";

pub(crate) fn store_error(err: sqlx::Error) -> StoreError {
    let constraint = err
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| {
            matches!(
                code.as_ref(),
                FOREIGN_KEY_VIOLATION | UNIQUE_VIOLATION | CHECK_VIOLATION
            )
        });
    if constraint {
        StoreError::Integrity(err.to_string())
    } else {
        StoreError::backend(err)
    }
}

fn product_type(raw: i16) -> Result<ProductTypeId, StoreError> {
    ProductTypeId::new(raw).map_err(|e| StoreError::Integrity(e.to_string()))
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CategoryRecord {
    pub id: i64,
    pub external_id: String,
    pub name: String,
    pub slug: String,
    pub path: String,
    pub product_type: i16,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<CategoryRecord> for Category {
    type Error = StoreError;

    fn try_from(row: CategoryRecord) -> Result<Self, Self::Error> {
        let path = row.path.parse::<CategoryPath>().map_err(|e| {
            StoreError::Integrity(format!("category {} has invalid path: {e}", row.id))
        })?;
        Ok(Category {
            id: row.id,
            external_id: row.external_id,
            name: row.name,
            slug: row.slug,
            path,
            product_type: product_type(row.product_type)?,
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProductRecord {
    pub id: i64,
    pub external_id: String,
    pub name: String,
    pub slug: String,
    pub category_id: i64,
    pub category_external_id: String,
    pub product_type: i16,
    pub manufacturer: Option<String>,
    pub stock: i32,
    pub photo: Option<String>,
    pub scheme: Option<String>,
    pub is_sale: bool,
    pub is_new: bool,
    pub pack_quantity: i32,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductRecord {
    pub(crate) fn into_product(self, prices: Vec<PriceEntry>) -> Result<Product, StoreError> {
        Ok(Product {
            id: self.id,
            external_id: self.external_id,
            name: self.name,
            slug: self.slug,
            category_id: self.category_id,
            category_external_id: self.category_external_id,
            product_type: product_type(self.product_type)?,
            manufacturer: self.manufacturer,
            stock: self.stock,
            photo: self.photo,
            scheme: self.scheme,
            is_sale: self.is_sale,
            is_new: self.is_new,
            pack_quantity: self.pack_quantity,
            prices,
            is_deleted: self.is_deleted,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PriceRecord {
    pub product_id: i64,
    pub price_type: i16,
    pub amount: Decimal,
    pub currency: String,
}

impl From<PriceRecord> for PriceEntry {
    fn from(row: PriceRecord) -> Self {
        PriceEntry {
            price_type: PriceTypeCode::new(row.price_type),
            amount: row.amount,
            currency: row.currency,
        }
    }
}

/// A product listing row with the price of one price type joined in.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProductListRecord {
    pub id: i64,
    pub external_id: String,
    pub name: String,
    pub slug: String,
    pub category_id: i64,
    pub product_type: i16,
    pub manufacturer: Option<String>,
    pub stock: i32,
    pub photo: Option<String>,
    pub scheme: Option<String>,
    pub is_sale: bool,
    pub is_new: bool,
    pub pack_quantity: i32,
    pub price: Option<Decimal>,
    pub currency: Option<String>,
}

impl TryFrom<ProductListRecord> for ProductRow {
    type Error = StoreError;

    fn try_from(row: ProductListRecord) -> Result<Self, Self::Error> {
        Ok(ProductRow {
            id: row.id,
            external_id: row.external_id,
            name: row.name,
            slug: row.slug,
            category_id: row.category_id,
            product_type: product_type(row.product_type)?,
            manufacturer: row.manufacturer,
            stock: row.stock,
            photo: row.photo,
            scheme: row.scheme,
            is_sale: row.is_sale,
            is_new: row.is_new,
            pack_quantity: row.pack_quantity,
            price: row.price,
            currency: row.currency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category_record(path: &str, product_type: i16) -> CategoryRecord {
        CategoryRecord {
            id: 7,
            external_id: "10".to_string(),
            name: "Doors".to_string(),
            slug: "doors".to_string(),
            path: path.to_string(),
            product_type,
            is_deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn category_record_converts_with_parsed_path() {
        let category = Category::try_from(category_record("10.11", 1)).unwrap();
        assert_eq!(category.path.depth(), 2);
        assert_eq!(category.product_type.get(), 1);
    }

    #[test]
    fn corrupt_path_is_an_integrity_error() {
        let err = Category::try_from(category_record("10..11", 1)).unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)), "got: {err}");
    }

    #[test]
    fn non_positive_product_type_is_an_integrity_error() {
        let err = Category::try_from(category_record("10", 0)).unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)));
    }

    #[test]
    fn pool_errors_are_backend_errors() {
        let err = store_error(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Backend(_)));
    }
}
