//! Persisted catalog entities.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::path::CategoryPath;
use crate::CoreError;

/// Identifier of a product-type partition (e.g. `1` = doors, `2` = hardware).
///
/// Reconciliation and most queries are scoped to exactly one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub struct ProductTypeId(i16);

impl ProductTypeId {
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidProductType`] unless `raw` is positive.
    pub fn new(raw: i16) -> Result<Self, CoreError> {
        if raw > 0 {
            Ok(Self(raw))
        } else {
            Err(CoreError::InvalidProductType(i64::from(raw)))
        }
    }

    #[must_use]
    pub fn get(self) -> i16 {
        self.0
    }
}

impl TryFrom<i16> for ProductTypeId {
    type Error = CoreError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProductTypeId> for i16 {
    fn from(value: ProductTypeId) -> Self {
        value.0
    }
}

impl fmt::Display for ProductTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProductTypeId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: i64 = s
            .trim()
            .parse()
            .map_err(|_| CoreError::InvalidProductType(0))?;
        i16::try_from(raw)
            .map_err(|_| CoreError::InvalidProductType(raw))
            .and_then(Self::new)
    }
}

/// Selects one of several parallel price lists (retail, wholesale, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceTypeCode(i16);

impl PriceTypeCode {
    #[must_use]
    pub const fn new(raw: i16) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn get(self) -> i16 {
        self.0
    }
}

impl fmt::Display for PriceTypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PriceTypeCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i16>()
            .ok()
            .filter(|code| *code > 0)
            .map(Self)
            .ok_or_else(|| CoreError::InvalidPriceType(s.to_string()))
    }
}

/// One price of a product in one price list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceEntry {
    pub price_type: PriceTypeCode,
    pub amount: Decimal,
    /// ISO 4217 code, upper case.
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Internal, store-assigned id.
    pub id: i64,
    /// Stable id from the ERP feed, unique within a product type.
    pub external_id: String,
    pub name: String,
    pub slug: String,
    pub path: CategoryPath,
    pub product_type: ProductTypeId,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub external_id: String,
    pub name: String,
    pub slug: String,
    pub category_id: i64,
    /// External id of the owning category, joined in on load so diffs can
    /// compare against feed references without a second lookup.
    pub category_external_id: String,
    pub product_type: ProductTypeId,
    pub manufacturer: Option<String>,
    pub stock: i32,
    pub photo: Option<String>,
    pub scheme: Option<String>,
    pub is_sale: bool,
    pub is_new: bool,
    pub pack_quantity: i32,
    /// Sorted by price type, at most one entry per code.
    pub prices: Vec<PriceEntry>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[must_use]
    pub fn price_for(&self, price_type: PriceTypeCode) -> Option<&PriceEntry> {
        self.prices.iter().find(|p| p.price_type == price_type)
    }
}
