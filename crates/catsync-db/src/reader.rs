//! Read side: filtered, sorted, paginated product listings and the live
//! category set.

use async_trait::async_trait;
use catsync_core::{
    CatalogReader, Category, Pagination, PriceTypeCode, ProductFilter, ProductRow, ProductSort,
    ProductTypeId, SortDirection, SortField, StoreError,
};
use sqlx::PgPool;

use crate::records::{store_error, CategoryRecord, ProductListRecord};

// Parameters $1..$5 are shared by the count and list queries.
const PRODUCT_FILTER: &str = "NOT p.is_deleted \
    AND ($1::TEXT IS NULL OR p.name ILIKE $1 ESCAPE '\\') \
    AND ($2::BIGINT IS NULL \
         OR p.category_id = $2 \
         OR ($3::BOOLEAN AND EXISTS ( \
                SELECT 1 FROM categories w \
                WHERE w.id = $2 \
                  AND w.product_type = c.product_type \
                  AND starts_with(c.path, w.path || '.')))) \
    AND ($4::INTEGER IS NULL OR p.stock >= $4) \
    AND ($5::SMALLINT IS NULL OR p.product_type = $5)";

const PRODUCT_COLUMNS: &str = "p.id, p.external_id, p.name, p.slug, p.category_id, \
    p.product_type, p.manufacturer, p.stock, p.photo, p.scheme, p.is_sale, p.is_new, \
    p.pack_quantity, pp.amount AS price, pp.currency";

#[derive(Debug, Clone)]
pub struct PgCatalogReader {
    pool: PgPool,
}

impl PgCatalogReader {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// `%term%` with `LIKE` metacharacters escaped, or `None` for a blank search.
fn search_pattern(filter: &ProductFilter) -> Option<String> {
    filter.search_term().map(|term| {
        let mut pattern = String::with_capacity(term.len() + 2);
        pattern.push('%');
        for ch in term.chars() {
            if matches!(ch, '\\' | '%' | '_') {
                pattern.push('\\');
            }
            pattern.push(ch);
        }
        pattern.push('%');
        pattern
    })
}

/// Products without the sort key go last in both directions; `id` breaks ties.
fn order_by(sort: ProductSort) -> &'static str {
    match (sort.field, sort.direction) {
        (SortField::Name, SortDirection::Asc) => "lower(p.name) ASC, p.id ASC",
        (SortField::Name, SortDirection::Desc) => "lower(p.name) DESC, p.id ASC",
        (SortField::Price, SortDirection::Asc) => "pp.amount ASC NULLS LAST, p.id ASC",
        (SortField::Price, SortDirection::Desc) => "pp.amount DESC NULLS LAST, p.id ASC",
        (SortField::Manufacturer, SortDirection::Asc) => {
            "lower(p.manufacturer) ASC NULLS LAST, p.id ASC"
        }
        (SortField::Manufacturer, SortDirection::Desc) => {
            "lower(p.manufacturer) DESC NULLS LAST, p.id ASC"
        }
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl CatalogReader for PgCatalogReader {
    async fn count_products(&self, filter: &ProductFilter) -> Result<u64, StoreError> {
        let sql = format!(
            "SELECT COUNT(*) FROM products p \
             JOIN categories c ON c.id = p.category_id \
             WHERE {PRODUCT_FILTER}"
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(search_pattern(filter))
            .bind(filter.category_id)
            .bind(filter.include_subcategories)
            .bind(filter.min_stock)
            .bind(filter.product_type.map(ProductTypeId::get))
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        pagination: Pagination,
        sort: ProductSort,
        price_type: PriceTypeCode,
    ) -> Result<Vec<ProductRow>, StoreError> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} \
             FROM products p \
             JOIN categories c ON c.id = p.category_id \
             LEFT JOIN product_prices pp ON pp.product_id = p.id AND pp.price_type = $6 \
             WHERE {PRODUCT_FILTER} \
             ORDER BY {} \
             LIMIT $7 OFFSET $8",
            order_by(sort)
        );
        let rows = sqlx::query_as::<_, ProductListRecord>(&sql)
            .bind(search_pattern(filter))
            .bind(filter.category_id)
            .bind(filter.include_subcategories)
            .bind(filter.min_stock)
            .bind(filter.product_type.map(ProductTypeId::get))
            .bind(price_type.get())
            .bind(i64::from(pagination.page_size()))
            .bind(to_i64(pagination.offset()))
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        rows.into_iter().map(ProductRow::try_from).collect()
    }

    async fn get_product(
        &self,
        id: i64,
        price_type: PriceTypeCode,
    ) -> Result<Option<ProductRow>, StoreError> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} \
             FROM products p \
             LEFT JOIN product_prices pp ON pp.product_id = p.id AND pp.price_type = $2 \
             WHERE p.id = $1 AND NOT p.is_deleted"
        );
        let row = sqlx::query_as::<_, ProductListRecord>(&sql)
            .bind(id)
            .bind(price_type.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        row.map(ProductRow::try_from).transpose()
    }

    async fn list_categories(
        &self,
        product_type: Option<ProductTypeId>,
    ) -> Result<Vec<Category>, StoreError> {
        let rows = sqlx::query_as::<_, CategoryRecord>(
            "SELECT id, external_id, name, slug, path, product_type, is_deleted, \
                    created_at, updated_at \
             FROM categories \
             WHERE NOT is_deleted \
               AND ($1::SMALLINT IS NULL OR product_type = $1) \
             ORDER BY product_type, path, name",
        )
        .bind(product_type.map(ProductTypeId::get))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter().map(Category::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_pattern_escapes_like_metacharacters() {
        let filter = ProductFilter {
            search: Some(" 50%_off\\ ".to_string()),
            ..ProductFilter::default()
        };
        assert_eq!(search_pattern(&filter).as_deref(), Some("%50\\%\\_off\\\\%"));
    }

    #[test]
    fn blank_search_is_no_filter() {
        let filter = ProductFilter {
            search: Some("   ".to_string()),
            ..ProductFilter::default()
        };
        assert!(search_pattern(&filter).is_none());
    }

    #[test]
    fn every_order_breaks_ties_by_id() {
        for field in [SortField::Name, SortField::Price, SortField::Manufacturer] {
            for direction in [SortDirection::Asc, SortDirection::Desc] {
                let clause = order_by(ProductSort { field, direction });
                assert!(clause.ends_with("p.id ASC"), "{clause}");
            }
        }
    }

    #[test]
    fn missing_prices_sort_last_in_both_directions() {
        for direction in [SortDirection::Asc, SortDirection::Desc] {
            let clause = order_by(ProductSort {
                field: SortField::Price,
                direction,
            });
            assert!(clause.contains("NULLS LAST"), "{clause}");
        }
    }
}
