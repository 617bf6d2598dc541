use std::collections::BTreeMap;

use catsync_core::RawPrice;
use proptest::prelude::*;

use super::*;

fn pt() -> ProductTypeId {
    ProductTypeId::new(1).unwrap()
}

fn mapper() -> CatalogMapper {
    CatalogMapper::new([PriceTypeCode::new(1), PriceTypeCode::new(2)], "uah")
}

fn category(id: &str, parent: Option<&str>, name: &str) -> ImportRecord {
    ImportRecord {
        external_id: id.to_string(),
        name: name.to_string(),
        parent_external_id: parent.map(str::to_string),
        ..ImportRecord::default()
    }
}

fn product(id: &str, category: &str, name: &str) -> ImportRecord {
    ImportRecord {
        external_id: id.to_string(),
        name: name.to_string(),
        parent_external_id: Some(category.to_string()),
        ..ImportRecord::default()
    }
}

fn price(amount: &str, currency: Option<&str>) -> RawPrice {
    RawPrice {
        amount: amount.to_string(),
        currency: currency.map(str::to_string),
    }
}

fn feed(categories: Vec<ImportRecord>, products: Vec<ImportRecord>) -> ParsedFeed {
    ParsedFeed {
        product_type: pt(),
        categories,
        products,
    }
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

#[test]
fn resolves_paths_regardless_of_feed_order() {
    let records = vec![
        category("12", Some("11"), "Oak"),
        category("11", Some("10"), "Interior"),
        category("10", None, "Doors"),
    ];
    let (mapped, index) = mapper().map_categories(pt(), &records).unwrap();

    let paths: Vec<String> = mapped.iter().map(|c| c.path.to_string()).collect();
    assert_eq!(paths, vec!["10.11.12", "10.11", "10"]);
    assert_eq!(index.len(), 3);
    assert_eq!(index.path_of("11").unwrap().to_string(), "10.11");
}

#[test]
fn encodes_ids_that_are_not_label_safe() {
    let records = vec![category("doors.main", None, "Doors")];
    let (mapped, _) = mapper().map_categories(pt(), &records).unwrap();
    assert_eq!(mapped[0].path.to_string(), "doors_2emain");
}

#[test]
fn unknown_parent_fails_the_feed() {
    let records = vec![category("11", Some("10"), "Interior")];
    let err = mapper().map_categories(pt(), &records).unwrap_err();
    assert_eq!(
        err,
        MappingError::UnknownParent {
            external_id: "11".to_string(),
            parent_external_id: "10".to_string(),
        }
    );
}

#[test]
fn cycles_fail_the_feed() {
    let records = vec![
        category("a", Some("b"), "A"),
        category("b", Some("a"), "B"),
    ];
    assert!(matches!(
        mapper().map_categories(pt(), &records),
        Err(MappingError::CyclicHierarchy { .. })
    ));

    let self_parent = vec![category("a", Some("a"), "A")];
    assert!(matches!(
        mapper().map_categories(pt(), &self_parent),
        Err(MappingError::CyclicHierarchy { .. })
    ));
}

#[test]
fn duplicate_category_id_fails_the_feed() {
    let records = vec![category("1", None, "A"), category("1", None, "B")];
    assert_eq!(
        mapper().map_categories(pt(), &records).unwrap_err(),
        MappingError::DuplicateExternalId {
            kind: RecordKind::Category,
            external_id: "1".to_string(),
        }
    );
}

#[test]
fn category_slugs_are_unique_and_stable() {
    let records = vec![
        category("1", None, "Doors"),
        category("2", Some("1"), "Doors"),
        category("3", None, "???"),
    ];
    let (mapped, _) = mapper().map_categories(pt(), &records).unwrap();
    let slugs: Vec<&str> = mapped.iter().map(|c| c.slug.as_str()).collect();
    assert_eq!(slugs, vec!["doors", "doors-2", "3"]);
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

#[test]
fn maps_products_with_category_path() {
    let result = mapper()
        .map(&feed(
            vec![category("10", None, "Doors"), category("11", Some("10"), "Oak")],
            vec![product("P1", "11", "  Oak door ")],
        ))
        .unwrap();

    let p = &result.products[0];
    assert_eq!(p.name, "Oak door");
    assert_eq!(p.slug, "oak-door");
    assert_eq!(p.category_external_id, "11");
    assert_eq!(p.category_path.to_string(), "10.11");
    assert_eq!(p.pack_quantity, 1);
    assert_eq!(result.product_type, pt());
}

#[test]
fn unknown_category_fails_the_feed() {
    let err = mapper()
        .map(&feed(
            vec![category("10", None, "Doors")],
            vec![product("P1", "99", "Door")],
        ))
        .unwrap_err();
    assert_eq!(
        err,
        MappingError::UnknownCategory {
            product_external_id: "P1".to_string(),
            category_external_id: Some("99".to_string()),
        }
    );
}

#[test]
fn missing_category_reference_fails_the_feed() {
    let mut orphan = product("P1", "10", "Door");
    orphan.parent_external_id = None;
    let err = mapper()
        .map(&feed(vec![category("10", None, "Doors")], vec![orphan]))
        .unwrap_err();
    assert!(matches!(
        err,
        MappingError::UnknownCategory {
            category_external_id: None,
            ..
        }
    ));
}

#[test]
fn duplicate_product_id_fails_the_feed() {
    let err = mapper()
        .map(&feed(
            vec![category("10", None, "Doors")],
            vec![product("P1", "10", "A"), product("P1", "10", "B")],
        ))
        .unwrap_err();
    assert!(matches!(
        err,
        MappingError::DuplicateExternalId {
            kind: RecordKind::Product,
            ..
        }
    ));
}

#[test]
fn normalizes_stock_and_pack_quantity() {
    let mut p = product("P1", "10", "Door");
    p.stock = -4;
    p.pack_quantity = Some(0);
    let result = mapper()
        .map(&feed(vec![category("10", None, "Doors")], vec![p]))
        .unwrap();
    assert_eq!(result.products[0].stock, 0);
    assert_eq!(result.products[0].pack_quantity, 1);
}

#[test]
fn prices_are_filtered_normalized_and_sorted() {
    let mut p = product("P1", "10", "Door");
    p.prices = BTreeMap::from([
        ("2".to_string(), price("1 000,5", None)),
        ("1".to_string(), price("1200.555", Some("eur"))),
        ("3".to_string(), price("10", None)),
        ("x".to_string(), price("10", None)),
    ]);
    let result = mapper()
        .map(&feed(vec![category("10", None, "Doors")], vec![p]))
        .unwrap();
    let prices = &result.products[0].prices;

    assert_eq!(prices.len(), 2);
    assert_eq!(prices[0].price_type, PriceTypeCode::new(1));
    assert_eq!(prices[0].amount, Decimal::new(120_056, 2));
    assert_eq!(prices[0].currency, "EUR");
    assert_eq!(prices[1].price_type, PriceTypeCode::new(2));
    assert_eq!(prices[1].amount, Decimal::new(10005, 1));
    assert_eq!(prices[1].currency, "UAH");
}

#[test]
fn first_spelling_of_a_price_code_wins() {
    let mut p = product("P1", "10", "Door");
    p.prices = BTreeMap::from([
        ("01".to_string(), price("5", None)),
        ("1".to_string(), price("7", None)),
    ]);
    let result = mapper()
        .map(&feed(vec![category("10", None, "Doors")], vec![p]))
        .unwrap();
    let prices = &result.products[0].prices;
    assert_eq!(prices.len(), 1);
    assert_eq!(prices[0].amount, Decimal::new(5, 0));
}

#[test]
fn invalid_price_values_are_dropped() {
    let mut p = product("P1", "10", "Door");
    p.prices = BTreeMap::from([
        ("1".to_string(), price("free", None)),
        ("2".to_string(), price("-5", None)),
    ]);
    let mut q = product("P2", "10", "Frame");
    q.prices = BTreeMap::from([("1".to_string(), price("5", Some("hryvnia")))]);

    let result = mapper()
        .map(&feed(vec![category("10", None, "Doors")], vec![p, q]))
        .unwrap();
    assert!(result.products[0].prices.is_empty());
    assert!(result.products[1].prices.is_empty());
}

#[test]
fn mapping_is_deterministic() {
    let input = feed(
        vec![category("10", None, "Doors"), category("11", Some("10"), "Doors")],
        vec![product("P1", "11", "Door"), product("P2", "10", "Door")],
    );
    assert_eq!(mapper().map(&input).unwrap(), mapper().map(&input).unwrap());
}

// ---------------------------------------------------------------------------
// Property tests
// ---------------------------------------------------------------------------

/// Acyclic forests in shuffled feed order: record `ci` may only point at a
/// record `cj` with `j < i`.
fn arb_forest() -> impl Strategy<Value = Vec<ImportRecord>> {
    (1usize..30)
        .prop_flat_map(|n| {
            (0..n)
                .map(|i| {
                    if i == 0 {
                        Just(None::<usize>).boxed()
                    } else {
                        proptest::option::of(0..i).boxed()
                    }
                })
                .collect::<Vec<_>>()
        })
        .prop_map(|parents| {
            parents
                .iter()
                .enumerate()
                .map(|(i, parent)| {
                    let parent = parent.map(|p| format!("c{p}"));
                    category(&format!("c{i}"), parent.as_deref(), "Node")
                })
                .collect::<Vec<_>>()
        })
        .prop_flat_map(|records| Just(records).prop_shuffle())
}

proptest! {
    #[test]
    fn child_paths_extend_parent_paths(records in arb_forest()) {
        let (mapped, index) = mapper().map_categories(pt(), &records).unwrap();
        prop_assert_eq!(mapped.len(), records.len());
        for (record, category) in records.iter().zip(&mapped) {
            match &record.parent_external_id {
                None => prop_assert!(category.path.is_root()),
                Some(parent) => {
                    let expected = index.path_of(parent).cloned();
                    prop_assert_eq!(category.path.parent(), expected);
                }
            }
        }
        let slugs: HashSet<&str> = mapped.iter().map(|c| c.slug.as_str()).collect();
        prop_assert_eq!(slugs.len(), mapped.len());
    }
}
