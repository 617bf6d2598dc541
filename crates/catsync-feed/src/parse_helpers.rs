use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Trims a feed string; blank values become `None`.
pub(crate) fn clean_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Parses an ERP boolean flag. Blank means `false`.
pub(crate) fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "n" => Some(false),
        "1" | "true" | "yes" | "y" => Some(true),
        _ => None,
    }
}

/// Parses a whole-unit quantity. ERP exports often render integers as
/// `"5.000"` or `"5,0"`; fractional parts are truncated. Blank means `0`.
pub(crate) fn parse_count(value: &str) -> Option<i32> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Some(0);
    }
    if let Ok(n) = trimmed.parse::<i32>() {
        return Some(n);
    }
    normalize_decimal(trimmed)
        .parse::<Decimal>()
        .ok()
        .and_then(|d| d.trunc().to_i32())
}

/// Strips grouping spaces and turns a lone decimal comma into a point.
pub(crate) fn normalize_decimal(value: &str) -> String {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();
    if compact.contains('.') {
        compact
    } else {
        compact.replacen(',', ".", 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accept_common_spellings() {
        assert_eq!(parse_flag(" TRUE "), Some(true));
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag(""), Some(false));
        assert_eq!(parse_flag("no"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn counts_tolerate_decimal_renderings() {
        assert_eq!(parse_count("12"), Some(12));
        assert_eq!(parse_count("5.000"), Some(5));
        assert_eq!(parse_count("7,9"), Some(7));
        assert_eq!(parse_count("  "), Some(0));
        assert_eq!(parse_count("lots"), None);
    }

    #[test]
    fn decimal_normalization() {
        assert_eq!(normalize_decimal("1 200,50"), "1200.50");
        assert_eq!(normalize_decimal("1,200.50"), "1,200.50");
        assert_eq!(normalize_decimal("99"), "99");
    }

    #[test]
    fn blank_optional_is_none() {
        assert_eq!(clean_optional("  "), None);
        assert_eq!(clean_optional(" Acme "), Some("Acme".to_string()));
    }
}
