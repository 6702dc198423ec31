//! Semantic normalization of parsed entries into canonical shifts.
//!
//! Everything here is deterministic string work: address decomposition,
//! company-noise removal, trailing-duration stripping, shift classification,
//! and fingerprint derivation. OCR-confusion folding happens only inside the
//! fingerprints; display fields keep readable (accent-stripped, title-cased)
//! text the way the schedule app renders it.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use super::identity::{
    collapse_whitespace, customer_fingerprint, location_fingerprint, normalize_readable_text,
    COMPANY_NOISE_TOKENS,
};
use super::layout::ParsedEntry;
use super::shift::{CanonicalShift, ShiftType};
use super::time_of_day::TimeOfDay;

static POSTAL_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{3})\s?(\d{2})\b").expect("postal pattern compiles"));
static TRAILING_DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\b\d+\s*h(?:\s*\d+\s*m)?\b|\b\d+\s*m(?:in)?\b)\s*$")
        .expect("duration pattern compiles")
});

/// Job-type words that may follow the customer name inside one title line.
const JOB_TYPE_HINT_TOKENS: &[&str] = &[
    "skola",
    "kontor",
    "hemstadning",
    "stadservice",
    "stadning",
    "storstadning",
    "fonsterputs",
    "clickandgo",
];

/// Raised when an entry cannot be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("invalid {field} time: {value}")]
    InvalidTime { field: &'static str, value: String },
}

/// Decomposed address components before fingerprinting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct AddressParts {
    street: String,
    street_number: String,
    postal_code: String,
    postal_area: String,
    city: String,
}

/// Normalize a batch of entries; fails on the first invalid entry.
pub fn normalize_entries(entries: &[ParsedEntry]) -> Result<Vec<CanonicalShift>, NormalizeError> {
    entries.iter().map(normalize_entry).collect()
}

/// Normalize one parsed entry into its canonical, identity-bearing form.
pub fn normalize_entry(entry: &ParsedEntry) -> Result<CanonicalShift, NormalizeError> {
    let start = TimeOfDay::parse(&entry.start).map_err(|_| NormalizeError::InvalidTime {
        field: "start",
        value: entry.start.clone(),
    })?;
    let end = TimeOfDay::parse(&entry.end).map_err(|_| NormalizeError::InvalidTime {
        field: "end",
        value: entry.end.clone(),
    })?;

    let (customer_title, job_type_hint) = split_title_components(&entry.title);
    let address = decompose_address(&entry.address, &entry.location);
    let shift_type = classify_shift(entry, &address);
    let customer_name = normalize_customer_name(if customer_title.is_empty() {
        &entry.title
    } else {
        &customer_title
    });

    let location_key = location_fingerprint(
        &address.street,
        &address.street_number,
        &address.postal_area,
        &address.city,
    );
    // Entries without a usable customer still need a stable identity anchor.
    let identity_anchor = if customer_name.is_empty() {
        if job_type_hint.is_empty() {
            shift_type.as_str().to_owned()
        } else {
            job_type_hint.clone()
        }
    } else {
        customer_name.clone()
    };
    let customer_key = customer_fingerprint(&identity_anchor);

    Ok(CanonicalShift {
        start,
        end,
        customer_name,
        street: address.street,
        street_number: address.street_number,
        postal_code: address.postal_code,
        postal_area: address.postal_area,
        city: address.city,
        shift_type,
        location_fingerprint: location_key,
        customer_fingerprint: customer_key,
    })
}

/// Split `"Customer • Job type 2h"` (or space-joined variants) into the
/// customer part and the job-type hint.
fn split_title_components(value: &str) -> (String, String) {
    let collapsed = collapse_whitespace(value);
    if collapsed.is_empty() {
        return (String::new(), String::new());
    }

    if let Some((left, right)) = collapsed.split_once(['•', '·']) {
        return (
            collapse_whitespace(left),
            collapse_whitespace(&strip_trailing_duration(right)),
        );
    }

    let without_duration = strip_trailing_duration(&collapsed);
    let tokens: Vec<&str> = without_duration.split(' ').collect();
    for (index, token) in tokens.iter().enumerate().skip(1) {
        let folded = normalize_readable_text(token).to_lowercase();
        if JOB_TYPE_HINT_TOKENS.contains(&folded.as_str()) {
            return (
                collapse_whitespace(&tokens[..index].join(" ")),
                collapse_whitespace(&tokens[index..].join(" ")),
            );
        }
    }
    (without_duration, String::new())
}

fn strip_trailing_duration(value: &str) -> String {
    let mut current = collapse_whitespace(value);
    loop {
        let stripped = TRAILING_DURATION_RE.replace(&current, "").trim().to_owned();
        if stripped == current {
            return collapse_whitespace(&current);
        }
        current = stripped;
    }
}

fn normalize_customer_name(value: &str) -> String {
    let normalized = normalize_readable_text(&strip_trailing_duration(value));
    let lowered = normalized.to_lowercase();
    let mut tokens: Vec<&str> = lowered
        .split(' ')
        .filter(|t| !t.is_empty() && !COMPANY_NOISE_TOKENS.contains(t))
        .collect();
    if tokens.is_empty() {
        tokens = lowered.split(' ').filter(|t| !t.is_empty()).collect();
    }
    to_title_case(&tokens.join(" "))
}

fn decompose_address(address_text: &str, location_hint: &str) -> AddressParts {
    let normalized_address = normalize_readable_text(address_text);
    let normalized_location = to_title_case(&normalize_readable_text(location_hint));

    let mut parts = AddressParts {
        city: normalized_location.clone(),
        ..AddressParts::default()
    };

    let street_source = match POSTAL_CODE_RE.captures(&normalized_address) {
        Some(captures) => {
            parts.postal_code = format!("{} {}", &captures[1], &captures[2]);
            let whole = captures.get(0).expect("capture 0 always present");
            let before = collapse_whitespace(&normalized_address[..whole.start()]);
            let after = collapse_whitespace(&normalized_address[whole.end()..]);
            parts.postal_area = to_title_case(&after);
            if !parts.postal_area.is_empty() {
                parts.city = parts.postal_area.clone();
            }
            before
        }
        None => normalized_address.clone(),
    };

    let tokens: Vec<&str> = street_source.split(' ').filter(|t| !t.is_empty()).collect();
    let mut trailing: &[&str] = &[];
    match last_number_index(&tokens) {
        Some(index) => {
            parts.street = to_title_case(&tokens[..index].join(" "));
            parts.street_number = normalize_readable_text(tokens[index])
                .replace(' ', "")
                .to_uppercase();
            trailing = &tokens[index + 1..];
        }
        None => {
            parts.street = to_title_case(&street_source);
        }
    }

    if parts.city.is_empty() && !trailing.is_empty() {
        parts.city = extract_city_from_tokens(trailing);
    }
    if !parts.postal_code.is_empty() && parts.postal_area.is_empty() && !parts.city.is_empty() {
        parts.postal_area = parts.city.clone();
    }
    if parts.city.is_empty() && !normalized_location.is_empty() {
        parts.city = normalized_location;
    }
    parts
}

fn extract_city_from_tokens(tokens: &[&str]) -> String {
    let mut city_tokens: Vec<String> = Vec::new();
    for token in tokens.iter().rev() {
        if token.bytes().any(|b| b.is_ascii_digit()) {
            break;
        }
        let normalized = to_title_case(&normalize_readable_text(token));
        if normalized.is_empty() {
            break;
        }
        if normalized.chars().count() <= 2 && !city_tokens.is_empty() {
            break;
        }
        city_tokens.push(normalized);
        if city_tokens.len() == 2 {
            break;
        }
    }
    city_tokens.reverse();
    city_tokens.join(" ")
}

fn last_number_index(tokens: &[&str]) -> Option<usize> {
    tokens
        .iter()
        .rposition(|token| token.bytes().any(|b| b.is_ascii_digit()))
}

/// Map folded title/address/location text onto the closed shift type enum.
fn classify_shift(entry: &ParsedEntry, address: &AddressParts) -> ShiftType {
    let combined = format!(
        "{} {} {}",
        normalize_readable_text(&entry.title).to_lowercase(),
        normalize_readable_text(&entry.address).to_lowercase(),
        normalize_readable_text(&entry.location).to_lowercase(),
    );

    if combined.contains("skola") || combined.contains("school") {
        return ShiftType::School;
    }
    if combined.contains("kontor") || combined.contains("office") {
        return ShiftType::Office;
    }
    let home_tokens = [
        "hemstadning",
        "hem ",
        "stadservice",
        "stadning",
        "storstadning",
        "fonsterputs",
        "clickandgo",
    ];
    if home_tokens.iter().any(|token| combined.contains(token)) {
        return ShiftType::HomeVisit;
    }
    // A concrete street address with no other signal is a customer visit.
    if !address.street.is_empty() && !address.street_number.is_empty() {
        return ShiftType::HomeVisit;
    }
    ShiftType::Unknown
}

fn to_title_case(value: &str) -> String {
    value
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(|token| {
            let mut chars = token.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.

    use rstest::rstest;

    use super::*;

    fn entry(title: &str, address: &str, location: &str) -> ParsedEntry {
        ParsedEntry {
            start: "10:00".to_owned(),
            end: "14:00".to_owned(),
            title: title.to_owned(),
            location: location.to_owned(),
            address: address.to_owned(),
        }
    }

    #[rstest]
    fn decomposes_full_swedish_address() {
        let shift = normalize_entry(&entry("Acme AB • Hemstädning", "Storgatan 5 412 63 Göteborg", ""))
            .expect("normalizes");
        assert_eq!(shift.street, "Storgatan");
        assert_eq!(shift.street_number, "5");
        assert_eq!(shift.postal_code, "412 63");
        assert_eq!(shift.postal_area, "Goteborg");
        assert_eq!(shift.city, "Goteborg");
    }

    #[rstest]
    fn company_noise_is_removed_from_customer_name() {
        let shift = normalize_entry(&entry("Acme AB • Hemstädning", "Storgatan 5", ""))
            .expect("normalizes");
        assert_eq!(shift.customer_name, "Acme");
    }

    #[rstest]
    #[case("Vasaskolan • Skola", ShiftType::School)]
    #[case("Huvudkontoret kontor", ShiftType::Office)]
    #[case("Acme AB • Hemstädning", ShiftType::HomeVisit)]
    #[case("Acme", ShiftType::Unknown)]
    fn classifies_onto_closed_enum(#[case] title: &str, #[case] expected: ShiftType) {
        let shift = normalize_entry(&entry(title, "", "")).expect("normalizes");
        assert_eq!(shift.shift_type, expected);
    }

    #[rstest]
    fn street_address_without_labels_is_a_home_visit() {
        let shift = normalize_entry(&entry("Lindqvist", "Storgatan 5", "Göteborg"))
            .expect("normalizes");
        assert_eq!(shift.shift_type, ShiftType::HomeVisit);
    }

    #[rstest]
    fn trailing_duration_is_stripped_from_titles() {
        let shift = normalize_entry(&entry("Acme 2h 30m", "", "")).expect("normalizes");
        assert_eq!(shift.customer_name, "Acme");
    }

    #[rstest]
    fn location_hint_fills_missing_city() {
        let shift =
            normalize_entry(&entry("Acme", "Storgatan 5", "Göteborg")).expect("normalizes");
        assert_eq!(shift.city, "Goteborg");
    }

    #[rstest]
    fn equivalent_noisy_entries_share_fingerprints() {
        let clean = normalize_entry(&entry("Acme AB", "Storgatan 15", "Göteborg"))
            .expect("normalizes");
        let noisy = normalize_entry(&entry("acme", "STORGATAN l5", "Goteborg"))
            .expect("normalizes");
        assert_eq!(clean.location_fingerprint, noisy.location_fingerprint);
        assert_eq!(clean.customer_fingerprint, noisy.customer_fingerprint);
    }

    #[rstest]
    fn invalid_time_is_rejected() {
        let mut bad = entry("Acme", "", "");
        bad.start = "25:00".to_owned();
        assert_eq!(
            normalize_entry(&bad),
            Err(NormalizeError::InvalidTime {
                field: "start",
                value: "25:00".to_owned(),
            })
        );
    }

    #[rstest]
    fn dotted_times_are_accepted() {
        let mut dotted = entry("Acme", "", "");
        dotted.start = "9.30".to_owned();
        let shift = normalize_entry(&dotted).expect("normalizes");
        assert_eq!(shift.start.to_string(), "09:30");
    }

    #[rstest]
    fn titleless_entry_still_gets_an_identity_anchor() {
        let shift = normalize_entry(&entry("", "", "")).expect("normalizes");
        assert!(shift.customer_name.is_empty());
        assert!(!shift.customer_fingerprint.is_empty());
    }
}
