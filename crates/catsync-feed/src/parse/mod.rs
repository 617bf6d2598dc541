//! Feed payload parsing.
//!
//! Both wire formats produce the same [`ParsedFeed`]; records keep feed order
//! and raw values. Normalization and reference checks belong to
//! [`crate::map`].

mod json;
mod xml;

use std::io::Read;

use catsync_core::{FeedFormat, ImportRecord, ParsedFeed, ProductTypeId, RawPrice};

use crate::error::{ParseError, RecordKind};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Sniffs the wire format from the first significant byte.
///
/// Returns `None` for empty or unrecognised payloads.
#[must_use]
pub fn detect_format(bytes: &[u8]) -> Option<FeedFormat> {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match body.iter().find(|b| !b.is_ascii_whitespace())? {
        b'<' => Some(FeedFormat::Xml),
        b'{' | b'[' => Some(FeedFormat::Json),
        _ => None,
    }
}

/// Parses one feed payload for `product_type`.
///
/// `format` overrides sniffing when the source configuration pins it.
///
/// # Errors
///
/// Returns [`ParseError`] when the payload is empty, not UTF-8, syntactically
/// malformed, or a record lacks its id or name.
pub fn parse_feed(
    bytes: &[u8],
    product_type: ProductTypeId,
    format: Option<FeedFormat>,
) -> Result<ParsedFeed, ParseError> {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ParseError::Empty);
    }
    let format = match format {
        Some(format) => format,
        None => detect_format(body).ok_or(ParseError::UnknownFormat)?,
    };
    let text = std::str::from_utf8(body)?;

    let (categories, products) = match format {
        FeedFormat::Xml => xml::parse(text)?,
        FeedFormat::Json => json::parse(text)?,
    };

    tracing::debug!(
        %product_type,
        %format,
        categories = categories.len(),
        products = products.len(),
        "feed parsed"
    );

    Ok(ParsedFeed {
        product_type,
        categories,
        products,
    })
}

/// Reads the whole stream, then parses it as [`parse_feed`] does.
///
/// # Errors
///
/// Returns [`ParseError::Io`] if reading fails, otherwise as [`parse_feed`].
pub fn parse_feed_reader<R: Read>(
    mut reader: R,
    product_type: ProductTypeId,
    format: Option<FeedFormat>,
) -> Result<ParsedFeed, ParseError> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    parse_feed(&bytes, product_type, format)
}

/// Checks the identity fields every record must carry and trims them.
fn require_identity(
    mut record: ImportRecord,
    kind: RecordKind,
    index: usize,
) -> Result<ImportRecord, ParseError> {
    record.external_id = record.external_id.trim().to_string();
    record.name = record.name.trim().to_string();
    if record.external_id.is_empty() {
        return Err(ParseError::MissingField {
            kind,
            index,
            field: "id",
        });
    }
    if record.name.is_empty() {
        return Err(ParseError::MissingField {
            kind,
            index,
            field: "name",
        });
    }
    record.parent_external_id = record
        .parent_external_id
        .take()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());
    Ok(record)
}

/// Records a price; the first occurrence of a code wins.
fn insert_price(record: &mut ImportRecord, code: String, price: RawPrice) {
    let code = code.trim().to_string();
    if record.prices.contains_key(&code) {
        tracing::warn!(
            external_id = %record.external_id,
            price_type = %code,
            "duplicate price type in feed record, keeping the first"
        );
        return;
    }
    record.prices.insert(code, price);
}

#[cfg(test)]
#[path = "parse_test.rs"]
mod tests;
