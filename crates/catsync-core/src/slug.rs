//! URL-safe slugs for category and product names.

use std::collections::HashSet;

pub const SLUG_SEPARATOR: char = '-';

/// Fallback used when neither the name nor the external id yields any
/// slug characters.
const EMPTY_SLUG: &str = "item";

/// Derives a URL-safe slug from a display name.
///
/// The name is lowercased, Cyrillic is transliterated to Latin, Latin
/// diacritics are folded to their base letter, and every run of other
/// characters becomes a single [`SLUG_SEPARATOR`]. The result never starts
/// or ends with the separator and never contains two separators in a row.
/// Letters with no ASCII rendering are dropped without inserting a
/// separator. May return an empty string.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_separator = false;

    for ch in name.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            push_slug_part(&mut out, &mut pending_separator, ch.encode_utf8(&mut [0; 4]));
            continue;
        }
        if let Some(mapped) = transliterate(ch) {
            if !mapped.is_empty() {
                push_slug_part(&mut out, &mut pending_separator, mapped);
            }
            continue;
        }
        if ch.is_alphanumeric() {
            continue;
        }
        pending_separator = true;
    }

    out
}

fn push_slug_part(out: &mut String, pending_separator: &mut bool, part: &str) {
    if *pending_separator && !out.is_empty() {
        out.push(SLUG_SEPARATOR);
    }
    *pending_separator = false;
    out.push_str(part);
}

fn transliterate(ch: char) -> Option<&'static str> {
    let mapped = match ch {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "h",
        'ґ' => "g",
        'д' => "d",
        'е' | 'э' => "e",
        'є' => "ie",
        'ё' => "io",
        'ж' => "zh",
        'з' => "z",
        'и' | 'ы' => "y",
        'і' | 'ї' | 'й' => "i",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "kh",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "shch",
        'ю' => "iu",
        'я' => "ia",
        'ь' | 'ъ' | '\'' | '’' | 'ʼ' => "",
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'æ' => "ae",
        'ç' | 'ć' | 'č' => "c",
        'ď' | 'đ' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'ğ' => "g",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => "i",
        'ł' | 'ľ' | 'ĺ' => "l",
        'ñ' | 'ń' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'œ' => "oe",
        'ŕ' | 'ř' => "r",
        'ś' | 'š' | 'ş' => "s",
        'ß' => "ss",
        'ť' | 'ţ' => "t",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        _ => return None,
    };
    Some(mapped)
}

/// Hands out slugs unique within one batch.
///
/// The first record to claim a slug keeps it; later collisions get `-2`,
/// `-3`, ... in arrival order, so identical input always produces identical
/// slugs.
#[derive(Debug, Default)]
pub struct SlugAllocator {
    used: HashSet<String>,
}

impl SlugAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a slug for `name`, falling back to the slugified `fallback`
    /// (typically the external id) when the name has no usable characters.
    pub fn allocate(&mut self, name: &str, fallback: &str) -> String {
        let mut base = slugify(name);
        if base.is_empty() {
            base = slugify(fallback);
        }
        if base.is_empty() {
            base = EMPTY_SLUG.to_string();
        }

        if self.used.insert(base.clone()) {
            return base;
        }

        let mut suffix = 2usize;
        loop {
            let candidate = format!("{base}{SLUG_SEPARATOR}{suffix}");
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            suffix += 1;
        }
    }
}
