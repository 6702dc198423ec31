//! Canonical per-day payload construction and hashing.
//!
//! The payload serialization is the semantic identity of a day: fixed key
//! order, absent fields as `null`, shifts sorted by
//! `(start, end, location_fingerprint, customer_fingerprint)`, no
//! insignificant whitespace. Two semantically equal days must serialize to
//! identical bytes, so the JSON is rendered by hand rather than through a
//! map type whose key order could drift.

use std::fmt::Write as _;

use chrono::NaiveDate;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

use super::hashing::sha256_hex;
use super::identity::collapse_whitespace;
use super::shift::{AggregatedShift, CanonicalShift, CanonicalShiftDecodeError};

/// A fully canonicalized day: sorted shifts, payload bytes, and their hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalDay {
    pub schedule_date: NaiveDate,
    pub shifts: Vec<CanonicalShift>,
    /// UTF-8 payload exactly as persisted and hashed.
    pub payload: String,
    /// Lowercase hex SHA-256 of `payload`.
    pub payload_hash: String,
}

/// Failures raised while canonicalizing a day.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CanonicalizationError {
    /// `schedule_date` is not an ISO `YYYY-MM-DD` date.
    #[error("invalid schedule date: {0}")]
    InvalidDate(String),
    /// A shift failed time or identity validation.
    #[error(transparent)]
    InvalidShift(#[from] CanonicalShiftDecodeError),
}

/// Canonicalize one day of aggregated shifts.
///
/// Pure and deterministic: input order never influences the output payload.
pub fn canonicalize_day(
    schedule_date: &str,
    shifts: &[AggregatedShift],
) -> Result<CanonicalDay, CanonicalizationError> {
    let date = parse_iso_date(schedule_date)
        .ok_or_else(|| CanonicalizationError::InvalidDate(schedule_date.to_owned()))?;

    let mut ordered: Vec<CanonicalShift> = shifts
        .iter()
        .map(|aggregated| normalize_display_fields(&aggregated.shift))
        .collect();
    ordered.sort_by(|a, b| a.canonical_sort_key().cmp(&b.canonical_sort_key()));

    let mut payload = String::new();
    let _ = write!(payload, "{{\"schedule_date\":{},\"shifts\":[", json_string(&date.format("%Y-%m-%d").to_string()));
    for (index, shift) in ordered.iter().enumerate() {
        if index > 0 {
            payload.push(',');
        }
        payload.push_str(&canonical_shift_json(shift));
    }
    payload.push_str("]}");

    let payload_hash = sha256_hex(payload.as_bytes());
    Ok(CanonicalDay {
        schedule_date: date,
        shifts: ordered,
        payload,
        payload_hash,
    })
}

/// Render one shift in the fixed canonical key order.
///
/// Empty display fields are emitted as `null` so presence stays stable.
pub fn canonical_shift_json(shift: &CanonicalShift) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "{{\"start\":{},\"end\":{},\"customer_name\":{},\"street\":{},\"street_number\":{},\"postal_code\":{},\"postal_area\":{},\"city\":{},\"shift_type\":{},\"location_fingerprint\":{},\"customer_fingerprint\":{}}}",
        json_string(&shift.start.to_string()),
        json_string(&shift.end.to_string()),
        json_nullable(&shift.customer_name),
        json_nullable(&shift.street),
        json_nullable(&shift.street_number),
        json_nullable(&shift.postal_code),
        json_nullable(&shift.postal_area),
        json_nullable(&shift.city),
        json_string(shift.shift_type.as_str()),
        json_string(&shift.location_fingerprint),
        json_string(&shift.customer_fingerprint),
    );
    out
}

/// Strict zero-padded `YYYY-MM-DD`; chrono alone would accept `2026-3-2`.
fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    let bytes = value.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

fn normalize_display_fields(shift: &CanonicalShift) -> CanonicalShift {
    let clean = |value: &str| collapse_whitespace(&value.nfc().collect::<String>());
    CanonicalShift {
        start: shift.start,
        end: shift.end,
        customer_name: clean(&shift.customer_name),
        street: clean(&shift.street),
        street_number: clean(&shift.street_number),
        postal_code: clean(&shift.postal_code),
        postal_area: clean(&shift.postal_area),
        city: clean(&shift.city),
        shift_type: shift.shift_type,
        location_fingerprint: shift.location_fingerprint.clone(),
        customer_fingerprint: shift.customer_fingerprint.clone(),
    }
}

fn json_nullable(value: &str) -> String {
    if value.is_empty() {
        "null".to_owned()
    } else {
        json_string(value)
    }
}

fn json_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_owned())
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.

    use rstest::rstest;

    use super::*;
    use crate::domain::shift::ShiftType;
    use crate::domain::time_of_day::TimeOfDay;

    fn shift(start: &str, end: &str, location: &str, customer: &str) -> AggregatedShift {
        AggregatedShift {
            shift: CanonicalShift {
                start: TimeOfDay::parse(start).expect("valid time"),
                end: TimeOfDay::parse(end).expect("valid time"),
                customer_name: "Acme".to_owned(),
                street: "Storgatan".to_owned(),
                street_number: "5".to_owned(),
                postal_code: String::new(),
                postal_area: String::new(),
                city: "Goteborg".to_owned(),
                shift_type: ShiftType::HomeVisit,
                location_fingerprint: location.to_owned(),
                customer_fingerprint: customer.to_owned(),
            },
            source_count: 1,
        }
    }

    #[rstest]
    fn payload_is_stable_under_input_reordering() {
        let a = shift("10:00", "14:00", "loc-a", "cust-a");
        let b = shift("08:00", "09:00", "loc-b", "cust-b");
        let forward = canonicalize_day("2026-03-02", &[a.clone(), b.clone()]).expect("valid day");
        let reversed = canonicalize_day("2026-03-02", &[b, a]).expect("valid day");
        assert_eq!(forward.payload, reversed.payload);
        assert_eq!(forward.payload_hash, reversed.payload_hash);
    }

    #[rstest]
    fn payload_is_stable_under_whitespace_and_nfc_noise() {
        let clean = shift("10:00", "14:00", "loc-a", "cust-a");
        let mut noisy = clean.clone();
        noisy.shift.customer_name = "  Acme ".to_owned();
        // NFC-equivalent decomposed form of "é" must hash identically.
        let composed = shift("10:00", "14:00", "loc-c", "cust-c");
        let mut composed = composed;
        composed.shift.customer_name = "Andr\u{e9}".to_owned();
        let mut decomposed = composed.clone();
        decomposed.shift.customer_name = "Andre\u{301}".to_owned();

        let left = canonicalize_day("2026-03-02", &[clean, composed]).expect("valid day");
        let right = canonicalize_day("2026-03-02", &[noisy, decomposed]).expect("valid day");
        assert_eq!(left.payload_hash, right.payload_hash);
    }

    #[rstest]
    fn empty_fields_render_as_null_and_order_is_fixed() {
        let day = canonicalize_day("2026-03-02", &[shift("10:00", "14:00", "loc", "cust")])
            .expect("valid day");
        assert!(day.payload.starts_with("{\"schedule_date\":\"2026-03-02\",\"shifts\":["));
        assert!(day.payload.contains("\"postal_code\":null"));
        let start_key = day.payload.find("\"start\"").expect("start key");
        let city_key = day.payload.find("\"city\"").expect("city key");
        assert!(start_key < city_key);
    }

    #[rstest]
    fn empty_day_still_canonicalizes() {
        let day = canonicalize_day("2026-03-02", &[]).expect("valid day");
        assert_eq!(day.payload, "{\"schedule_date\":\"2026-03-02\",\"shifts\":[]}");
        assert_eq!(day.payload_hash.len(), 64);
    }

    #[rstest]
    #[case("2026-3-2")]
    #[case("02-03-2026")]
    #[case("not-a-date")]
    fn non_iso_dates_are_rejected(#[case] input: &str) {
        assert!(matches!(
            canonicalize_day(input, &[]),
            Err(CanonicalizationError::InvalidDate(_))
        ));
    }
}
