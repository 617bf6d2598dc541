//! Product query specifications: filtering, sorting, and pagination.
//!
//! The types here are shared by every [`crate::CatalogReader`]
//! implementation. SQL-backed readers translate them into `WHERE`/`ORDER BY`
//! clauses; in-process readers evaluate them with [`ProductFilter::matches`],
//! [`sort_rows`], and [`Pagination::slice`], which define the reference
//! semantics.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::catalog::{PriceTypeCode, Product, ProductTypeId};
use crate::path::CategoryPath;

/// Where each category sits: its partition and its path. Paths are only
/// unique within one product type.
pub type CategoryLocations = HashMap<i64, (ProductTypeId, CategoryPath)>;

/// Product filter; every field is optional and set fields are ANDed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    /// Case-insensitive substring of the product name.
    pub search: Option<String>,
    pub category_id: Option<i64>,
    /// Also match products in descendant categories of `category_id`.
    pub include_subcategories: bool,
    /// Minimum stock quantity, inclusive.
    pub min_stock: Option<i32>,
    pub product_type: Option<ProductTypeId>,
}

impl ProductFilter {
    /// Search term trimmed, or `None` when blank.
    #[must_use]
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Evaluates the filter against one product.
    ///
    /// `categories` is consulted only when `include_subcategories` is set. A
    /// descendant must live in the same product type as `category_id`.
    #[must_use]
    pub fn matches(&self, product: &Product, categories: &CategoryLocations) -> bool {
        if product.is_deleted {
            return false;
        }
        if let Some(term) = self.search_term() {
            if !product
                .name
                .to_lowercase()
                .contains(&term.to_lowercase())
            {
                return false;
            }
        }
        if let Some(category_id) = self.category_id {
            let direct = product.category_id == category_id;
            let nested = self.include_subcategories
                && match (
                    categories.get(&product.category_id),
                    categories.get(&category_id),
                ) {
                    (Some((own_type, own)), Some((wanted_type, wanted))) => {
                        own_type == wanted_type && own.is_self_or_descendant_of(wanted)
                    }
                    _ => false,
                };
            if !direct && !nested {
                return false;
            }
        }
        if let Some(min_stock) = self.min_stock {
            if product.stock < min_stock {
                return false;
            }
        }
        if let Some(product_type) = self.product_type {
            if product.product_type != product_type {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Name,
    Price,
    Manufacturer,
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "price" => Ok(Self::Price),
            "manufacturer" => Ok(Self::Manufacturer),
            other => Err(format!("unknown sort field {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!("unknown sort direction {other:?}")),
        }
    }
}

/// Sort order for product listings.
///
/// Names compare case-insensitively. Products without a price in the
/// requested price type, or without a manufacturer, always sort last,
/// whichever the direction. Ties are broken by id ascending so pages are
/// stable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSort {
    pub field: SortField,
    pub direction: SortDirection,
}

/// 1-indexed page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    page: u32,
    page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(1, 12)
    }
}

impl Pagination {
    /// Page and page size are floored at 1.
    #[must_use]
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.max(1),
        }
    }

    #[must_use]
    pub fn page(&self) -> u32 {
        self.page
    }

    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    /// Cuts the requested page out of a fully sorted list.
    #[must_use]
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        let offset = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        items
            .into_iter()
            .skip(offset)
            .take(self.page_size as usize)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub total: u64,
    pub page_size: u32,
    pub current_page: u32,
    pub total_pages: u64,
    pub has_prev: bool,
    pub has_next: bool,
}

impl PageInfo {
    #[must_use]
    pub fn new(total: u64, pagination: Pagination) -> Self {
        let page_size = pagination.page_size();
        let current_page = pagination.page();
        let total_pages = total.div_ceil(u64::from(page_size));
        Self {
            total,
            page_size,
            current_page,
            total_pages,
            has_prev: current_page > 1,
            has_next: u64::from(current_page) < total_pages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub info: PageInfo,
}

/// Read-side projection of a product with one resolved price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRow {
    pub id: i64,
    pub external_id: String,
    pub name: String,
    pub slug: String,
    pub category_id: i64,
    pub product_type: ProductTypeId,
    pub manufacturer: Option<String>,
    pub stock: i32,
    pub photo: Option<String>,
    pub scheme: Option<String>,
    pub is_sale: bool,
    pub is_new: bool,
    pub pack_quantity: i32,
    /// Price in the requested price type, if the product has one.
    pub price: Option<Decimal>,
    pub currency: Option<String>,
}

impl ProductRow {
    #[must_use]
    pub fn from_product(product: &Product, price_type: PriceTypeCode) -> Self {
        let price = product.price_for(price_type);
        Self {
            id: product.id,
            external_id: product.external_id.clone(),
            name: product.name.clone(),
            slug: product.slug.clone(),
            category_id: product.category_id,
            product_type: product.product_type,
            manufacturer: product.manufacturer.clone(),
            stock: product.stock,
            photo: product.photo.clone(),
            scheme: product.scheme.clone(),
            is_sale: product.is_sale,
            is_new: product.is_new,
            pack_quantity: product.pack_quantity,
            price: price.map(|p| p.amount),
            currency: price.map(|p| p.currency.clone()),
        }
    }
}

impl fmt::Display for ProductRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} [{}]", self.id, self.name, self.external_id)?;
        if let (Some(price), Some(currency)) = (self.price, &self.currency) {
            write!(f, " {price} {currency}")?;
        }
        write!(f, " stock={}", self.stock)
    }
}

/// Sorts rows in place according to [`ProductSort`].
pub fn sort_rows(rows: &mut [ProductRow], sort: ProductSort) {
    rows.sort_by(|a, b| compare_rows(a, b, sort));
}

fn compare_rows(a: &ProductRow, b: &ProductRow, sort: ProductSort) -> Ordering {
    let primary = match sort.field {
        SortField::Name => directed(
            a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            sort.direction,
        ),
        SortField::Price => missing_last(a.price.as_ref(), b.price.as_ref(), sort.direction),
        SortField::Manufacturer => missing_last(
            a.manufacturer.as_ref().map(|m| m.to_lowercase()).as_ref(),
            b.manufacturer.as_ref().map(|m| m.to_lowercase()).as_ref(),
            sort.direction,
        ),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

fn missing_last<T: Ord>(a: Option<&T>, b: Option<&T>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => directed(a.cmp(b), direction),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
#[path = "query_test.rs"]
mod tests;
