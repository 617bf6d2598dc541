//! JSON export layout:
//!
//! ```json
//! {
//!   "categories": [{ "id": "10", "parentId": null, "name": "Doors" }],
//!   "products": [{
//!     "id": "A-100", "categoryId": "11", "name": "Oak door",
//!     "manufacturer": "Acme", "stock": 5, "photo": null, "scheme": null,
//!     "sale": true, "new": false, "packQuantity": 2,
//!     "prices": [{ "type": 1, "amount": "1200.50", "currency": "UAH" }]
//!   }]
//! }
//! ```
//!
//! Ids, counts and amounts may be strings or numbers. `prices` may also be an
//! object keyed by price type: `{ "1": "1200.50" }`.

use std::collections::BTreeMap;

use catsync_core::{ImportRecord, RawPrice};
use serde::Deserialize;

use super::{insert_price, require_identity};
use crate::error::{ParseError, RecordKind};
use crate::parse_helpers::{clean_optional, parse_count, parse_flag};

type Records = (Vec<ImportRecord>, Vec<ImportRecord>);

#[derive(Debug, Deserialize)]
struct JsonFeed {
    #[serde(default)]
    categories: Vec<JsonCategory>,
    #[serde(default, alias = "offers")]
    products: Vec<JsonProduct>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Scalar::Bool(b) => b.to_string(),
            Scalar::Integer(n) => n.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonCategory {
    id: Option<Scalar>,
    #[serde(alias = "parent_id")]
    parent_id: Option<Scalar>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonProduct {
    id: Option<Scalar>,
    #[serde(alias = "category_id")]
    category_id: Option<Scalar>,
    name: Option<String>,
    #[serde(alias = "vendor")]
    manufacturer: Option<String>,
    #[serde(alias = "quantity")]
    stock: Option<Scalar>,
    #[serde(alias = "picture")]
    photo: Option<String>,
    scheme: Option<String>,
    sale: Option<Scalar>,
    new: Option<Scalar>,
    #[serde(alias = "pack_quantity")]
    pack_quantity: Option<Scalar>,
    prices: Option<JsonPrices>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonPrices {
    List(Vec<JsonPrice>),
    ByType(BTreeMap<String, Scalar>),
}

#[derive(Debug, Deserialize)]
struct JsonPrice {
    #[serde(rename = "type", alias = "priceType")]
    price_type: Option<Scalar>,
    amount: Option<Scalar>,
    currency: Option<String>,
}

pub(super) fn parse(text: &str) -> Result<Records, ParseError> {
    let feed: JsonFeed = serde_json::from_str(text)?;

    let categories = feed
        .categories
        .into_iter()
        .enumerate()
        .map(|(index, c)| {
            let record = ImportRecord {
                external_id: c.id.map(Scalar::into_text).unwrap_or_default(),
                name: c.name.unwrap_or_default(),
                parent_external_id: c.parent_id.map(Scalar::into_text),
                ..ImportRecord::default()
            };
            require_identity(record, RecordKind::Category, index)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let products = feed
        .products
        .into_iter()
        .enumerate()
        .map(|(index, p)| product_record(p, index))
        .collect::<Result<Vec<_>, _>>()?;

    Ok((categories, products))
}

fn product_record(p: JsonProduct, index: usize) -> Result<ImportRecord, ParseError> {
    let mut record = require_identity(
        ImportRecord {
            external_id: p.id.map(Scalar::into_text).unwrap_or_default(),
            name: p.name.unwrap_or_default(),
            parent_external_id: p.category_id.map(Scalar::into_text),
            manufacturer: p.manufacturer.as_deref().and_then(clean_optional),
            photo: p.photo.as_deref().and_then(clean_optional),
            scheme: p.scheme.as_deref().and_then(clean_optional),
            ..ImportRecord::default()
        },
        RecordKind::Product,
        index,
    )?;

    let invalid = |field: &'static str, value: String, external_id: &str| {
        ParseError::InvalidValue {
            kind: RecordKind::Product,
            external_id: external_id.to_string(),
            field,
            value,
        }
    };

    if let Some(stock) = p.stock {
        record.stock =
            count(stock).map_err(|value| invalid("stock", value, &record.external_id))?;
    }
    if let Some(pack) = p.pack_quantity {
        record.pack_quantity =
            Some(count(pack).map_err(|value| invalid("packQuantity", value, &record.external_id))?);
    }
    if let Some(sale) = p.sale {
        record.is_sale = flag(sale).map_err(|value| invalid("sale", value, &record.external_id))?;
    }
    if let Some(new) = p.new {
        record.is_new = flag(new).map_err(|value| invalid("new", value, &record.external_id))?;
    }

    match p.prices {
        Some(JsonPrices::List(prices)) => {
            for price in prices {
                let Some(code) = price.price_type else {
                    tracing::warn!(
                        external_id = %record.external_id,
                        "price without a type, skipping"
                    );
                    continue;
                };
                let raw = RawPrice {
                    amount: price.amount.map(Scalar::into_text).unwrap_or_default(),
                    currency: price.currency.as_deref().and_then(clean_optional),
                };
                insert_price(&mut record, code.into_text(), raw);
            }
        }
        Some(JsonPrices::ByType(prices)) => {
            for (code, amount) in prices {
                let raw = RawPrice {
                    amount: amount.into_text(),
                    currency: None,
                };
                insert_price(&mut record, code, raw);
            }
        }
        None => {}
    }

    Ok(record)
}

fn count(value: Scalar) -> Result<i32, String> {
    match value {
        Scalar::Integer(n) => i32::try_from(n).map_err(|_| n.to_string()),
        other => {
            let text = other.into_text();
            parse_count(&text).ok_or(text)
        }
    }
}

fn flag(value: Scalar) -> Result<bool, String> {
    match value {
        Scalar::Bool(b) => Ok(b),
        other => {
            let text = other.into_text();
            parse_flag(&text).ok_or(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_scalar_types() {
        let json = r#"{
            "categories": [
                {"id": 10, "name": "Doors"},
                {"id": "11", "parentId": 10, "name": " Interior "}
            ],
            "products": [{
                "id": 500, "categoryId": 11, "name": "Oak door",
                "vendor": "Acme", "stock": "3.000", "sale": "yes", "new": 0,
                "packQuantity": 4,
                "prices": [
                    {"type": 1, "amount": 1200.5, "currency": "uah"},
                    {"type": "2", "amount": "1000"},
                    {"amount": "5"}
                ]
            }]
        }"#;
        let (categories, products) = parse(json).unwrap();
        assert_eq!(categories[0].external_id, "10");
        assert_eq!(categories[1].name, "Interior");
        assert_eq!(categories[1].parent_external_id.as_deref(), Some("10"));

        let door = &products[0];
        assert_eq!(door.external_id, "500");
        assert_eq!(door.parent_external_id.as_deref(), Some("11"));
        assert_eq!(door.manufacturer.as_deref(), Some("Acme"));
        assert_eq!(door.stock, 3);
        assert!(door.is_sale);
        assert!(!door.is_new);
        assert_eq!(door.pack_quantity, Some(4));
        assert_eq!(door.prices.len(), 2);
        assert_eq!(door.prices["1"].amount, "1200.5");
        assert_eq!(door.prices["1"].currency.as_deref(), Some("uah"));
    }

    #[test]
    fn prices_keyed_by_type() {
        let json = r#"{"products": [{"id": "A", "categoryId": "1", "name": "Door",
            "prices": {"1": "10.00", "3": 7}}]}"#;
        let (_, products) = parse(json).unwrap();
        assert_eq!(products[0].prices["1"].amount, "10.00");
        assert_eq!(products[0].prices["3"].amount, "7");
    }

    #[test]
    fn missing_product_name_is_rejected() {
        let json = r#"{"products": [{"id": "A", "categoryId": "1"}]}"#;
        assert!(matches!(
            parse(json),
            Err(ParseError::MissingField {
                kind: RecordKind::Product,
                field: "name",
                ..
            })
        ));
    }

    #[test]
    fn syntax_error_is_rejected() {
        assert!(matches!(
            parse(r#"{"categories": [{"id": 1,"#),
            Err(ParseError::Json(_))
        ));
    }

    #[test]
    fn out_of_range_stock_is_invalid() {
        let json = r#"{"products": [{"id": "A", "categoryId": "1", "name": "Door", "stock": 99999999999}]}"#;
        assert!(matches!(
            parse(json),
            Err(ParseError::InvalidValue { field: "stock", .. })
        ));
    }
}
