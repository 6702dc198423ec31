//! Persisted schedule-event values and their dedupe hashing.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::canonical::canonical_shift_json;
use super::hashing::sha256_hex;
use super::session::UserId;
use super::shift::CanonicalShift;

/// Closed set of semantic change kinds.
///
/// The declaration order doubles as the deterministic event emission order,
/// so keep it aligned with the notification templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScheduleEventType {
    Added,
    Removed,
    TimeChanged,
    Relocated,
    Retitled,
    Reclassified,
}

impl ScheduleEventType {
    /// Wire name stored in event rows.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "shift_added",
            Self::Removed => "shift_removed",
            Self::TimeChanged => "shift_time_changed",
            Self::Relocated => "shift_relocated",
            Self::Retitled => "shift_retitled",
            Self::Reclassified => "shift_reclassified",
        }
    }

    /// All kinds in emission order; used for summary counting.
    pub fn all() -> [Self; 6] {
        [
            Self::Added,
            Self::Removed,
            Self::TimeChanged,
            Self::Relocated,
            Self::Retitled,
            Self::Reclassified,
        ]
    }
}

impl fmt::Display for ScheduleEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a stored row carries an unknown event type name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown schedule event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for ScheduleEventType {
    type Err = UnknownEventType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "shift_added" => Ok(Self::Added),
            "shift_removed" => Ok(Self::Removed),
            "shift_time_changed" => Ok(Self::TimeChanged),
            "shift_relocated" => Ok(Self::Relocated),
            "shift_retitled" => Ok(Self::Retitled),
            "shift_reclassified" => Ok(Self::Reclassified),
            other => Err(UnknownEventType(other.to_owned())),
        }
    }
}

/// A schedule event as read back from the event store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredScheduleEvent {
    pub event_id: Uuid,
    pub user_id: UserId,
    pub schedule_date: NaiveDate,
    pub event_type: ScheduleEventType,
    pub location_fingerprint: String,
    pub customer_fingerprint: String,
    pub old_value: Option<CanonicalShift>,
    pub new_value: Option<CanonicalShift>,
    pub detected_at: DateTime<Utc>,
    pub source_session_id: Uuid,
}

impl StoredScheduleEvent {
    /// The side that carries the event's current identity and times.
    pub fn anchor(&self) -> Option<&CanonicalShift> {
        self.new_value.as_ref().or(self.old_value.as_ref())
    }
}

/// Dedupe hash over one event side: canonical shift JSON, or the fixed
/// sentinel `null` for an absent side.
pub fn shift_value_hash(value: Option<&CanonicalShift>) -> String {
    match value {
        Some(shift) => sha256_hex(canonical_shift_json(shift).as_bytes()),
        None => sha256_hex(b"null"),
    }
}
