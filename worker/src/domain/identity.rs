//! Deterministic entity fingerprints for schedule objects.
//!
//! Fingerprints are the identity anchors used by aggregation, diffing, and
//! event dedupe. They must stay stable under casing, whitespace, accents, and
//! the common OCR confusions (`0↔O`, `1↔l↔I`), so all folding happens here
//! and nowhere else. Display fields keep their readable form.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use super::hashing::sha256_hex;

/// Company suffixes and cleaning-branch words that carry no identity.
pub(crate) const COMPANY_NOISE_TOKENS: &[&str] =
    &["ab", "hb", "stadservice", "stadtjanst", "stadning"];

/// Identity key for a physical location.
///
/// The postal area wins over the city when both are present; the pair is
/// folded so that OCR noise in either resolves to the same key.
pub fn location_fingerprint(
    street: &str,
    street_number: &str,
    postal_area: &str,
    city: &str,
) -> String {
    let place = if postal_area.is_empty() { city } else { postal_area };
    let source = format!(
        "{}|{}|{}",
        fold_component(street),
        fold_component(street_number),
        fold_component(place)
    );
    sha256_hex(source.as_bytes())
}

/// Identity key for a customer display name.
///
/// The longest token is treated as the surname; the remaining tokens
/// contribute sorted initials. Company noise tokens are dropped unless the
/// name consists of nothing else.
pub fn customer_fingerprint(customer_name: &str) -> String {
    let normalized = normalize_readable_text(customer_name).to_lowercase();
    let raw_tokens: Vec<&str> = normalized.split(' ').filter(|t| !t.is_empty()).collect();
    let mut tokens: Vec<&str> = raw_tokens
        .iter()
        .copied()
        .filter(|token| !COMPANY_NOISE_TOKENS.contains(token))
        .collect();
    if tokens.is_empty() {
        tokens = raw_tokens;
    }
    if tokens.is_empty() {
        return sha256_hex(b"");
    }

    let surname = tokens
        .iter()
        .copied()
        .max_by_key(|token| token.chars().count())
        .unwrap_or_default();
    let mut initials: Vec<char> = tokens
        .iter()
        .filter(|token| **token != surname)
        .filter_map(|token| token.chars().next())
        .collect();
    initials.sort_unstable();
    let initials: String = initials.into_iter().collect();
    sha256_hex(format!("{surname}|{initials}").as_bytes())
}

/// Collapse whitespace, strip accents, and keep only letters, digits,
/// spaces, hyphens, and apostrophes.
pub(crate) fn normalize_readable_text(value: &str) -> String {
    let collapsed = collapse_whitespace(value);
    if collapsed.is_empty() {
        return String::new();
    }
    let stripped = strip_accents(&collapsed);
    let filtered: String = stripped
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '\'' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    collapse_whitespace(&filtered)
}

/// NFKD-decompose and drop combining marks.
pub(crate) fn strip_accents(value: &str) -> String {
    value.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

pub(crate) fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold_component(value: &str) -> String {
    let base = normalize_readable_text(value).to_lowercase();
    if base.is_empty() {
        return String::new();
    }
    base.chars()
        .filter_map(|c| match c {
            '0' | 'o' => Some('o'),
            '1' | 'i' | 'l' | '|' => Some('l'),
            c if c.is_ascii_lowercase() || c.is_ascii_digit() => Some(c),
            _ => None,
        })
        .collect()
}
