//! Domain types, algorithms, and ports for the schedule-ingest worker.

pub mod aggregate;
pub mod canonical;
pub mod diff;
pub mod error;
pub mod events;
mod hashing;
pub mod identity;
pub mod layout;
pub mod normalize;
pub mod notification_rules;
pub mod ports;
pub mod processor;
pub mod schedule_date;
pub mod session;
pub mod shift;
pub mod time_of_day;

pub use aggregate::{aggregate_session_shifts, AggregationConfig, AggregationError};
pub use canonical::{canonicalize_day, CanonicalDay, CanonicalizationError};
pub use diff::{apply_events, diff_day, ScheduleDiffEvent};
pub use error::{truncate_error_text, WorkerError, WorkerStage};
pub use events::{shift_value_hash, ScheduleEventType, StoredScheduleEvent};
pub use hashing::sha256_hex;
pub use identity::{customer_fingerprint, location_fingerprint};
pub use layout::{parse_layout, ParsedEntry, TextBox};
pub use normalize::{normalize_entries, normalize_entry, NormalizeError};
pub use notification_rules::{build_notifications, NotificationType, UserNotification};
pub use processor::{
    IterationReport, LeaseHeartbeat, SessionProcessor, SessionProcessorConfig,
    SessionProcessorPorts,
};
pub use schedule_date::{detect_schedule_date, resolve_session_date, ScheduleDateError};
pub use session::{
    CaptureImage, ClaimedSession, InvalidStateName, LeaseGuard, SessionStateNames, UserId,
};
pub use shift::{
    AggregatedShift, CanonicalShift, CanonicalShiftRecord, CanonicalShiftDecodeError, ShiftType,
};
pub use time_of_day::{circular_centroid, TimeOfDay, TimeParseError};
