//! XML export layout:
//!
//! ```xml
//! <catalog>
//!   <categories>
//!     <category id="10">Doors</category>
//!     <category id="11" parentId="10">Interior doors</category>
//!   </categories>
//!   <offers>
//!     <offer id="A-100" categoryId="11">
//!       <name>Oak door</name>
//!       <vendor>Acme</vendor>
//!       <stock>5</stock>
//!       <picture>https://cdn.example/a100.jpg</picture>
//!       <scheme>https://cdn.example/a100.pdf</scheme>
//!       <sale>1</sale>
//!       <new>0</new>
//!       <packQuantity>2</packQuantity>
//!       <price type="1" currency="UAH">1200.50</price>
//!     </offer>
//!   </offers>
//! </catalog>
//! ```
//!
//! `product` is accepted for `offer`, `manufacturer` for `vendor`, `photo`
//! for `picture`, `quantity` for `stock`. The category reference may be an
//! attribute or a `<categoryId>` child. Only direct children of a record are
//! read as fields; unknown elements are skipped together with everything
//! inside them.

use catsync_core::{ImportRecord, RawPrice};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{insert_price, require_identity};
use crate::error::{ParseError, RecordKind};
use crate::parse_helpers::{clean_optional, parse_count, parse_flag};

type Records = (Vec<ImportRecord>, Vec<ImportRecord>);

pub(super) fn parse(text: &str) -> Result<Records, ParseError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut builder = FeedBuilder::default();

    loop {
        let position = reader.buffer_position();
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                builder.start(&e, position)?;
                builder.open.push(element_name(&e));
            }
            Ok(Event::Empty(e)) => {
                builder.start(&e, position)?;
                builder.end()?;
            }
            Ok(Event::End(_)) => {
                builder.open.pop();
                builder.end()?;
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| xml_error(position, err.to_string()))?;
                builder.push_text(&text);
            }
            Ok(Event::CData(e)) => {
                builder.push_text(&String::from_utf8_lossy(e.as_ref()));
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(reader.buffer_position(), e.to_string())),
            _ => {}
        }
    }

    if let Some(unclosed) = builder.open.last() {
        return Err(xml_error(
            reader.buffer_position(),
            format!("unexpected end of document inside <{unclosed}>"),
        ));
    }

    Ok((builder.categories, builder.products))
}

fn xml_error(position: u64, reason: String) -> ParseError {
    ParseError::Xml { position, reason }
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart<'_>, key: &str, position: u64) -> Result<Option<String>, ParseError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| xml_error(position, err.to_string()))?;
        if attr.key.local_name().as_ref() == key.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|err| xml_error(position, err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

enum Field {
    Name,
    CategoryRef,
    Manufacturer,
    Stock,
    Photo,
    Scheme,
    Sale,
    New,
    PackQuantity,
    Price {
        code: Option<String>,
        currency: Option<String>,
    },
}

struct OpenRecord {
    kind: RecordKind,
    record: ImportRecord,
    depth: usize,
}

#[derive(Default)]
struct FeedBuilder {
    categories: Vec<ImportRecord>,
    products: Vec<ImportRecord>,
    open: Vec<String>,
    current: Option<OpenRecord>,
    field: Option<(Field, usize)>,
    text: String,
}

impl FeedBuilder {
    fn start(&mut self, e: &BytesStart<'_>, position: u64) -> Result<(), ParseError> {
        let depth = self.open.len();
        let name = element_name(e);

        let Some((kind, record_depth)) = self.current.as_ref().map(|open| (open.kind, open.depth))
        else {
            let (kind, parent_attr) = match name.as_str() {
                "category" => (RecordKind::Category, "parentId"),
                "offer" | "product" => (RecordKind::Product, "categoryId"),
                _ => return Ok(()),
            };
            let record = ImportRecord {
                external_id: attribute(e, "id", position)?.unwrap_or_default(),
                parent_external_id: attribute(e, parent_attr, position)?,
                ..ImportRecord::default()
            };
            self.current = Some(OpenRecord {
                kind,
                record,
                depth,
            });
            self.text.clear();
            return Ok(());
        };

        if self.field.is_some() || depth != record_depth + 1 {
            return Ok(());
        }
        let field = match (kind, name.as_str()) {
            (_, "name") => Field::Name,
            (RecordKind::Category, "parentId") | (RecordKind::Product, "categoryId") => {
                Field::CategoryRef
            }
            (RecordKind::Product, "vendor" | "manufacturer") => Field::Manufacturer,
            (RecordKind::Product, "stock" | "quantity") => Field::Stock,
            (RecordKind::Product, "picture" | "photo") => Field::Photo,
            (RecordKind::Product, "scheme") => Field::Scheme,
            (RecordKind::Product, "sale") => Field::Sale,
            (RecordKind::Product, "new") => Field::New,
            (RecordKind::Product, "packQuantity" | "pack_quantity") => Field::PackQuantity,
            (RecordKind::Product, "price") => Field::Price {
                code: attribute(e, "type", position)?,
                currency: attribute(e, "currency", position)?,
            },
            _ => return Ok(()),
        };
        self.field = Some((field, depth));
        self.text.clear();
        Ok(())
    }

    /// Keeps text that belongs to an open field or sits directly inside the
    /// record; text of unknown children is dropped.
    fn push_text(&mut self, text: &str) {
        let Some(current) = &self.current else {
            return;
        };
        if self.field.is_some() || self.open.len() == current.depth + 1 {
            self.text.push_str(text);
        }
    }

    /// Closes the element at the current stack depth.
    fn end(&mut self) -> Result<(), ParseError> {
        let depth = self.open.len();

        if matches!(&self.field, Some((_, d)) if *d == depth) {
            if let (Some((field, _)), Some(current)) = (self.field.take(), self.current.as_mut()) {
                let text = std::mem::take(&mut self.text);
                apply_field(current, field, &text)?;
            }
            return Ok(());
        }

        if matches!(&self.current, Some(open) if open.depth == depth) {
            if let Some(OpenRecord { kind, mut record, .. }) = self.current.take() {
                let text = std::mem::take(&mut self.text);
                match kind {
                    RecordKind::Category => {
                        if record.name.trim().is_empty() {
                            record.name = text;
                        }
                        let index = self.categories.len();
                        self.categories.push(require_identity(record, kind, index)?);
                    }
                    RecordKind::Product => {
                        let index = self.products.len();
                        self.products.push(require_identity(record, kind, index)?);
                    }
                }
            }
        }
        Ok(())
    }
}

fn apply_field(current: &mut OpenRecord, field: Field, text: &str) -> Result<(), ParseError> {
    let kind = current.kind;
    let record = &mut current.record;
    let external_id = record.external_id.clone();
    let invalid = |field: &'static str| ParseError::InvalidValue {
        kind,
        external_id: external_id.clone(),
        field,
        value: text.trim().to_string(),
    };

    match field {
        Field::Name => record.name = text.trim().to_string(),
        Field::CategoryRef => record.parent_external_id = clean_optional(text),
        Field::Manufacturer => record.manufacturer = clean_optional(text),
        Field::Photo => record.photo = clean_optional(text),
        Field::Scheme => record.scheme = clean_optional(text),
        Field::Stock => record.stock = parse_count(text).ok_or_else(|| invalid("stock"))?,
        Field::Sale => record.is_sale = parse_flag(text).ok_or_else(|| invalid("sale"))?,
        Field::New => record.is_new = parse_flag(text).ok_or_else(|| invalid("new"))?,
        Field::PackQuantity => {
            record.pack_quantity = Some(parse_count(text).ok_or_else(|| invalid("packQuantity"))?);
        }
        Field::Price { code, currency } => match code {
            Some(code) => insert_price(
                record,
                code,
                RawPrice {
                    amount: text.trim().to_string(),
                    currency: currency.and_then(|c| clean_optional(&c)),
                },
            ),
            None => tracing::warn!(
                %external_id,
                "price without a type attribute, skipping"
            ),
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<catalog>
  <categories>
    <category id="10">Doors</category>
    <category id="11" parentId="10">Interior &amp; entry</category>
  </categories>
  <offers>
    <offer id="A-100" categoryId="11">
      <name>Oak door</name>
      <vendor>Acme</vendor>
      <stock>5</stock>
      <picture>https://cdn.example/a100.jpg</picture>
      <sale>1</sale>
      <packQuantity>2</packQuantity>
      <price type="1" currency="UAH">1200.50</price>
      <price type="2">1000</price>
      <price type="1">1.00</price>
    </offer>
    <product id="B-7">
      <name><![CDATA[Handle <brass>]]></name>
      <categoryId>10</categoryId>
    </product>
  </offers>
</catalog>"#;

    #[test]
    fn parses_categories_and_offers() {
        let (categories, products) = parse(SAMPLE).unwrap();
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].name, "Doors");
        assert_eq!(categories[0].parent_external_id, None);
        assert_eq!(categories[1].name, "Interior & entry");
        assert_eq!(categories[1].parent_external_id.as_deref(), Some("10"));

        assert_eq!(products.len(), 2);
        let oak = &products[0];
        assert_eq!(oak.external_id, "A-100");
        assert_eq!(oak.parent_external_id.as_deref(), Some("11"));
        assert_eq!(oak.manufacturer.as_deref(), Some("Acme"));
        assert_eq!(oak.stock, 5);
        assert!(oak.is_sale);
        assert!(!oak.is_new);
        assert_eq!(oak.pack_quantity, Some(2));
        assert_eq!(oak.scheme, None);
        assert_eq!(oak.prices.len(), 2);
        assert_eq!(oak.prices["1"].amount, "1200.50");
        assert_eq!(oak.prices["1"].currency.as_deref(), Some("UAH"));
        assert_eq!(oak.prices["2"].currency, None);

        let handle = &products[1];
        assert_eq!(handle.name, "Handle <brass>");
        assert_eq!(handle.parent_external_id.as_deref(), Some("10"));
        assert_eq!(handle.stock, 0);
    }

    #[test]
    fn missing_category_id_is_rejected() {
        let xml = r#"<catalog><categories><category>Doors</category></categories></catalog>"#;
        let err = parse(xml).unwrap_err();
        assert!(
            matches!(
                err,
                ParseError::MissingField {
                    kind: RecordKind::Category,
                    index: 0,
                    field: "id"
                }
            ),
            "got {err:?}"
        );
    }

    #[test]
    fn self_closing_category_without_name_is_rejected() {
        let xml = r#"<catalog><categories><category id="1"/></categories></catalog>"#;
        assert!(matches!(
            parse(xml),
            Err(ParseError::MissingField { field: "name", .. })
        ));
    }

    #[test]
    fn truncated_document_is_rejected() {
        let xml = r#"<catalog><offers><offer id="1" categoryId="2"><name>Door</name>"#;
        assert!(matches!(parse(xml), Err(ParseError::Xml { .. })));
    }

    #[test]
    fn mismatched_tags_are_rejected() {
        let xml = "<catalog><categories></offers></catalog>";
        assert!(matches!(parse(xml), Err(ParseError::Xml { .. })));
    }

    #[test]
    fn invalid_flag_reports_field() {
        let xml = r#"<catalog><offers><offer id="X1" categoryId="1"><name>Door</name><sale>perhaps</sale></offer></offers></catalog>"#;
        let err = parse(xml).unwrap_err();
        assert!(
            matches!(&err, ParseError::InvalidValue { field: "sale", external_id, .. } if external_id == "X1"),
            "got {err:?}"
        );
    }

    #[test]
    fn unknown_elements_are_ignored() {
        let xml = r#"<catalog><shop><title>ERP</title></shop><offers><offer id="1" categoryId="2"><name>Door</name><color>red</color></offer></offers></catalog>"#;
        let (categories, products) = parse(xml).unwrap();
        assert!(categories.is_empty());
        assert_eq!(products[0].name, "Door");
    }

    #[test]
    fn fields_nested_in_unknown_elements_do_not_override_the_record() {
        let xml = r#"<catalog><offers>
            <offer id="1" categoryId="2">
              <name>Oak door</name>
              <param><name>Color</name><stock>9</stock></param>
              <stock>4</stock>
            </offer>
        </offers></catalog>"#;
        let (_, products) = parse(xml).unwrap();
        assert_eq!(products[0].name, "Oak door");
        assert_eq!(products[0].stock, 4);
    }

    #[test]
    fn category_name_ignores_text_of_unknown_children() {
        let xml = r#"<catalog><categories><category id="1"><note>x</note>Doors</category></categories></catalog>"#;
        let (categories, _) = parse(xml).unwrap();
        assert_eq!(categories[0].name, "Doors");
    }
}
