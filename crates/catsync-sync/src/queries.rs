//! Read service over [`CatalogReader`]: paged product listings, single
//! product lookup, and the category tree.

use std::collections::BTreeMap;

use catsync_core::{
    build_tree, find_subtree, CatalogReader, Category, CategoryNode, Page, PageInfo, Pagination,
    PriceTypeCode, ProductFilter, ProductRow, ProductSort, ProductTypeId, StoreError,
};

pub struct CatalogQueries<R> {
    reader: R,
}

impl<R: CatalogReader> CatalogQueries<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Counts matches, then fetches the requested page.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError`] from the reader.
    pub async fn product_page(
        &self,
        filter: &ProductFilter,
        pagination: Pagination,
        sort: ProductSort,
        price_type: PriceTypeCode,
    ) -> Result<Page<ProductRow>, StoreError> {
        let total = self.reader.count_products(filter).await?;
        let info = PageInfo::new(total, pagination);

        let items = if pagination.offset() >= total {
            Vec::new()
        } else {
            self.reader
                .list_products(filter, pagination, sort, price_type)
                .await?
        };

        tracing::debug!(
            total,
            page = info.current_page,
            returned = items.len(),
            "product page served"
        );
        Ok(Page { items, info })
    }

    /// # Errors
    ///
    /// Propagates [`StoreError`] from the reader.
    pub async fn get_product(
        &self,
        id: i64,
        price_type: PriceTypeCode,
    ) -> Result<Option<ProductRow>, StoreError> {
        self.reader.get_product(id, price_type).await
    }

    /// Live categories as a forest, optionally for one partition. Without a
    /// partition each product type contributes its own roots, in product
    /// type order.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError`] from the reader.
    pub async fn category_tree(
        &self,
        product_type: Option<ProductTypeId>,
    ) -> Result<Vec<CategoryNode>, StoreError> {
        let categories = self.reader.list_categories(product_type).await?;
        Ok(forest_by_partition(categories))
    }

    /// The node `id` with its descendants, or `None` if no live category has
    /// that id.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError`] from the reader.
    pub async fn category_subtree(&self, id: i64) -> Result<Option<CategoryNode>, StoreError> {
        let categories = self.reader.list_categories(None).await?;
        let tree = forest_by_partition(categories);
        Ok(find_subtree(&tree, id).cloned())
    }
}

/// Paths are only unique within a product type, so each partition is built
/// separately.
fn forest_by_partition(categories: Vec<Category>) -> Vec<CategoryNode> {
    let mut partitions: BTreeMap<ProductTypeId, Vec<Category>> = BTreeMap::new();
    for category in categories {
        partitions
            .entry(category.product_type)
            .or_default()
            .push(category);
    }
    partitions
        .values()
        .flat_map(|categories| build_tree(categories))
        .collect()
}
