//! Normalizes a [`ParsedFeed`] into the desired catalog state of one
//! partition.
//!
//! Referential problems (unknown parent, unknown category, cycles, duplicate
//! ids) fail the whole feed. Value-level problems in optional data (an
//! unparseable price, an unconfigured price type) drop that value with a
//! warning. The output depends only on the input, so mapping the same feed
//! twice yields identical results, slugs included.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use catsync_core::{
    AppConfig, CatalogParseResult, CategoryPath, ImportRecord, MappedCategory, MappedProduct,
    ParsedFeed, PriceEntry, PriceTypeCode, ProductTypeId, SlugAllocator,
};
use rust_decimal::Decimal;

use crate::error::{MappingError, RecordKind};
use crate::parse_helpers::normalize_decimal;

/// Prices are stored with two fractional digits.
const PRICE_SCALE: u32 = 2;

/// External category id to materialized path, for one feed.
#[derive(Debug, Clone, Default)]
pub struct CategoryIndex {
    paths: HashMap<String, CategoryPath>,
}

impl CategoryIndex {
    #[must_use]
    pub fn path_of(&self, external_id: &str) -> Option<&CategoryPath> {
        self.paths.get(external_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CatalogMapper {
    price_types: BTreeSet<PriceTypeCode>,
    default_currency: String,
}

impl CatalogMapper {
    pub fn new(
        price_types: impl IntoIterator<Item = PriceTypeCode>,
        default_currency: impl Into<String>,
    ) -> Self {
        Self {
            price_types: price_types.into_iter().collect(),
            default_currency: default_currency.into().to_ascii_uppercase(),
        }
    }

    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.price_types.iter().copied(),
            config.default_currency.clone(),
        )
    }

    /// Maps a whole feed: categories first, then products against the
    /// resulting [`CategoryIndex`].
    ///
    /// # Errors
    ///
    /// Returns [`MappingError`] on any referential or structural violation.
    pub fn map(&self, feed: &ParsedFeed) -> Result<CatalogParseResult, MappingError> {
        let (categories, index) = self.map_categories(feed.product_type, &feed.categories)?;
        let products = self.map_products(feed.product_type, &feed.products, &index)?;

        tracing::debug!(
            product_type = %feed.product_type,
            categories = categories.len(),
            products = products.len(),
            "feed mapped"
        );

        Ok(CatalogParseResult {
            product_type: feed.product_type,
            categories,
            products,
        })
    }

    /// Resolves every category's materialized path and slug. Output keeps
    /// feed order.
    ///
    /// # Errors
    ///
    /// - [`MappingError::DuplicateExternalId`] if two records share an id.
    /// - [`MappingError::UnknownParent`] if a parent id is not in the feed.
    /// - [`MappingError::CyclicHierarchy`] if the parent chain loops.
    pub fn map_categories(
        &self,
        product_type: ProductTypeId,
        records: &[ImportRecord],
    ) -> Result<(Vec<MappedCategory>, CategoryIndex), MappingError> {
        let mut by_id: HashMap<&str, &ImportRecord> = HashMap::with_capacity(records.len());
        for record in records {
            if by_id.insert(record.external_id.as_str(), record).is_some() {
                return Err(MappingError::DuplicateExternalId {
                    kind: RecordKind::Category,
                    external_id: record.external_id.clone(),
                });
            }
        }

        let mut resolver = PathResolver {
            by_id: &by_id,
            visiting: HashSet::new(),
            resolved: HashMap::with_capacity(records.len()),
        };
        let mut slugs = SlugAllocator::new();
        let mut categories = Vec::with_capacity(records.len());

        for record in records {
            let path = resolver.resolve(record)?;
            categories.push(MappedCategory {
                external_id: record.external_id.clone(),
                name: record.name.trim().to_string(),
                slug: slugs.allocate(&record.name, &record.external_id),
                path,
                product_type,
            });
        }

        Ok((
            categories,
            CategoryIndex {
                paths: resolver.resolved,
            },
        ))
    }

    /// # Errors
    ///
    /// - [`MappingError::DuplicateExternalId`] if two records share an id.
    /// - [`MappingError::UnknownCategory`] if a product's category is missing
    ///   from `index` or not given at all.
    pub fn map_products(
        &self,
        product_type: ProductTypeId,
        records: &[ImportRecord],
        index: &CategoryIndex,
    ) -> Result<Vec<MappedProduct>, MappingError> {
        let mut seen: HashSet<&str> = HashSet::with_capacity(records.len());
        let mut slugs = SlugAllocator::new();
        let mut products = Vec::with_capacity(records.len());

        for record in records {
            if !seen.insert(record.external_id.as_str()) {
                return Err(MappingError::DuplicateExternalId {
                    kind: RecordKind::Product,
                    external_id: record.external_id.clone(),
                });
            }

            let category = record
                .parent_external_id
                .as_deref()
                .and_then(|id| index.path_of(id).map(|path| (id, path)));
            let Some((category_external_id, category_path)) = category else {
                return Err(MappingError::UnknownCategory {
                    product_external_id: record.external_id.clone(),
                    category_external_id: record.parent_external_id.clone(),
                });
            };

            products.push(MappedProduct {
                external_id: record.external_id.clone(),
                name: record.name.trim().to_string(),
                slug: slugs.allocate(&record.name, &record.external_id),
                category_external_id: category_external_id.to_string(),
                category_path: category_path.clone(),
                product_type,
                manufacturer: record.manufacturer.clone(),
                stock: record.stock.max(0),
                photo: record.photo.clone(),
                scheme: record.scheme.clone(),
                is_sale: record.is_sale,
                is_new: record.is_new,
                pack_quantity: record.pack_quantity.filter(|q| *q >= 1).unwrap_or(1),
                prices: self.map_prices(record),
            });
        }

        Ok(products)
    }

    /// Keeps configured price types with a valid non-negative amount; one
    /// entry per code, sorted by code.
    fn map_prices(&self, record: &ImportRecord) -> Vec<PriceEntry> {
        let mut prices: BTreeMap<PriceTypeCode, PriceEntry> = BTreeMap::new();

        for (raw_code, raw) in &record.prices {
            let Ok(code) = raw_code.parse::<PriceTypeCode>() else {
                tracing::warn!(
                    external_id = %record.external_id,
                    price_type = %raw_code,
                    "unrecognised price type code, skipping"
                );
                continue;
            };
            if !self.price_types.contains(&code) {
                tracing::debug!(
                    external_id = %record.external_id,
                    price_type = %code,
                    "price type not configured, skipping"
                );
                continue;
            }

            let amount = match normalize_decimal(&raw.amount).parse::<Decimal>() {
                Ok(amount) if amount >= Decimal::ZERO => amount.round_dp(PRICE_SCALE),
                _ => {
                    tracing::warn!(
                        external_id = %record.external_id,
                        price_type = %code,
                        amount = %raw.amount,
                        "invalid price amount, skipping"
                    );
                    continue;
                }
            };

            let currency = match raw.currency.as_deref().map(str::trim) {
                None | Some("") => self.default_currency.clone(),
                Some(c) if c.len() == 3 && c.bytes().all(|b| b.is_ascii_alphabetic()) => {
                    c.to_ascii_uppercase()
                }
                Some(other) => {
                    tracing::warn!(
                        external_id = %record.external_id,
                        price_type = %code,
                        currency = %other,
                        "invalid currency code, skipping price"
                    );
                    continue;
                }
            };

            if prices.contains_key(&code) {
                tracing::warn!(
                    external_id = %record.external_id,
                    price_type = %code,
                    "duplicate price type after normalization, keeping the first"
                );
                continue;
            }
            prices.insert(
                code,
                PriceEntry {
                    price_type: code,
                    amount,
                    currency,
                },
            );
        }

        prices.into_values().collect()
    }
}

struct PathResolver<'a> {
    by_id: &'a HashMap<&'a str, &'a ImportRecord>,
    visiting: HashSet<&'a str>,
    resolved: HashMap<String, CategoryPath>,
}

impl<'a> PathResolver<'a> {
    fn resolve(&mut self, record: &'a ImportRecord) -> Result<CategoryPath, MappingError> {
        let id = record.external_id.as_str();
        if let Some(path) = self.resolved.get(id) {
            return Ok(path.clone());
        }
        if !self.visiting.insert(id) {
            return Err(MappingError::CyclicHierarchy {
                external_id: id.to_string(),
            });
        }

        let segment = CategoryPath::encode_segment(id);
        let path = match record.parent_external_id.as_deref() {
            None => CategoryPath::root(segment)?,
            Some(parent_id) => {
                let Some(parent) = self.by_id.get(parent_id).copied() else {
                    return Err(MappingError::UnknownParent {
                        external_id: id.to_string(),
                        parent_external_id: parent_id.to_string(),
                    });
                };
                self.resolve(parent)?.child(segment)?
            }
        };

        self.visiting.remove(id);
        self.resolved.insert(id.to_string(), path.clone());
        Ok(path)
    }
}

#[cfg(test)]
#[path = "map_test.rs"]
mod tests;
