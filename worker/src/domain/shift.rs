//! Canonical shift value types shared by the whole pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::time_of_day::{TimeOfDay, TimeParseError};

/// Closed classification of a shift.
///
/// The declaration order is load-bearing: aggregation breaks majority ties by
/// this order, so keep `School < Office < HomeVisit < Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShiftType {
    School,
    Office,
    HomeVisit,
    Unknown,
}

impl ShiftType {
    /// Wire name stored in payloads and event rows.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::School => "SCHOOL",
            Self::Office => "OFFICE",
            Self::HomeVisit => "HOME_VISIT",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Human label used in notification messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::School => "school shift",
            Self::Office => "office shift",
            Self::HomeVisit => "home visit",
            Self::Unknown => "unclassified shift",
        }
    }
}

impl fmt::Display for ShiftType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a stored payload carries an unknown shift type name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown shift type: {0}")]
pub struct UnknownShiftType(pub String);

impl FromStr for ShiftType {
    type Err = UnknownShiftType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "SCHOOL" => Ok(Self::School),
            "OFFICE" => Ok(Self::Office),
            "HOME_VISIT" => Ok(Self::HomeVisit),
            "UNKNOWN" => Ok(Self::Unknown),
            other => Err(UnknownShiftType(other.to_owned())),
        }
    }
}

/// A semantically normalized, identity-bearing work shift.
///
/// Address and customer fields hold readable display text (empty string when
/// the screenshot carried nothing); identity lives in the fingerprints.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalShift {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    pub customer_name: String,
    pub street: String,
    pub street_number: String,
    pub postal_code: String,
    pub postal_area: String,
    pub city: String,
    pub shift_type: ShiftType,
    pub location_fingerprint: String,
    pub customer_fingerprint: String,
}

impl CanonicalShift {
    /// Identity key used for diff pairing and event anchoring.
    pub fn identity_key(&self) -> (&str, &str) {
        (&self.location_fingerprint, &self.customer_fingerprint)
    }

    /// True when the two shifts occupy the same time range.
    pub fn same_times(&self, other: &Self) -> bool {
        self.start == other.start && self.end == other.end
    }

    /// True when any readable address component differs.
    pub fn address_differs(&self, other: &Self) -> bool {
        self.street != other.street
            || self.street_number != other.street_number
            || self.postal_code != other.postal_code
            || self.postal_area != other.postal_area
            || self.city != other.city
    }

    /// Canonical day ordering key: `(start, end, location, customer)`.
    pub fn canonical_sort_key(&self) -> (TimeOfDay, TimeOfDay, &str, &str) {
        (
            self.start,
            self.end,
            self.location_fingerprint.as_str(),
            self.customer_fingerprint.as_str(),
        )
    }
}

/// Serde-facing draft of a canonical shift.
///
/// Payloads encode absent fields as JSON `null`, so every field is optional
/// here and validated on the way into the domain type, mirroring how
/// snapshot rows are decoded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CanonicalShiftRecord {
    pub start: Option<String>,
    pub end: Option<String>,
    pub customer_name: Option<String>,
    pub street: Option<String>,
    pub street_number: Option<String>,
    pub postal_code: Option<String>,
    pub postal_area: Option<String>,
    pub city: Option<String>,
    pub shift_type: Option<String>,
    pub location_fingerprint: Option<String>,
    pub customer_fingerprint: Option<String>,
}

/// Validation failures when promoting a record to a domain shift.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CanonicalShiftDecodeError {
    /// Both endpoints were null; a shift without any time has no identity.
    #[error("shift has neither start nor end time")]
    MissingTimes,
    /// A present endpoint failed time validation.
    #[error("invalid shift time: {0}")]
    InvalidTime(#[from] TimeParseError),
    /// The record lacks one of the identity fingerprints.
    #[error("shift record is missing its {0} fingerprint")]
    MissingFingerprint(&'static str),
    /// The stored shift type name is not part of the closed enum.
    #[error(transparent)]
    UnknownShiftType(#[from] UnknownShiftType),
}

impl From<&CanonicalShift> for CanonicalShiftRecord {
    fn from(shift: &CanonicalShift) -> Self {
        let opt = |value: &str| {
            if value.is_empty() {
                None
            } else {
                Some(value.to_owned())
            }
        };
        Self {
            start: Some(shift.start.to_string()),
            end: Some(shift.end.to_string()),
            customer_name: opt(&shift.customer_name),
            street: opt(&shift.street),
            street_number: opt(&shift.street_number),
            postal_code: opt(&shift.postal_code),
            postal_area: opt(&shift.postal_area),
            city: opt(&shift.city),
            shift_type: Some(shift.shift_type.as_str().to_owned()),
            location_fingerprint: Some(shift.location_fingerprint.clone()),
            customer_fingerprint: Some(shift.customer_fingerprint.clone()),
        }
    }
}

impl TryFrom<CanonicalShiftRecord> for CanonicalShift {
    type Error = CanonicalShiftDecodeError;

    fn try_from(record: CanonicalShiftRecord) -> Result<Self, Self::Error> {
        let parse = |value: &Option<String>| -> Result<Option<TimeOfDay>, TimeParseError> {
            value
                .as_deref()
                .filter(|v| !v.trim().is_empty())
                .map(TimeOfDay::parse)
                .transpose()
        };
        let start = parse(&record.start)?;
        let end = parse(&record.end)?;
        let (start, end) = match (start, end) {
            (None, None) => return Err(CanonicalShiftDecodeError::MissingTimes),
            (Some(start), Some(end)) => (start, end),
            // A single observed time is treated as a point-in-time shift.
            (Some(start), None) => (start, start),
            (None, Some(end)) => (end, end),
        };

        let shift_type = match record.shift_type.as_deref() {
            None | Some("") => ShiftType::Unknown,
            Some(name) => name.parse()?,
        };
        let location_fingerprint = record
            .location_fingerprint
            .filter(|v| !v.is_empty())
            .ok_or(CanonicalShiftDecodeError::MissingFingerprint("location"))?;
        let customer_fingerprint = record
            .customer_fingerprint
            .filter(|v| !v.is_empty())
            .ok_or(CanonicalShiftDecodeError::MissingFingerprint("customer"))?;

        Ok(Self {
            start,
            end,
            customer_name: record.customer_name.unwrap_or_default(),
            street: record.street.unwrap_or_default(),
            street_number: record.street_number.unwrap_or_default(),
            postal_code: record.postal_code.unwrap_or_default(),
            postal_area: record.postal_area.unwrap_or_default(),
            city: record.city.unwrap_or_default(),
            shift_type,
            location_fingerprint,
            customer_fingerprint,
        })
    }
}

/// A canonical shift produced by merging one or more screenshot observations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedShift {
    pub shift: CanonicalShift,
    /// Number of merged observations behind this shift.
    pub source_count: usize,
}
