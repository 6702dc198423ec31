//! Port for the durable event history and day snapshot.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::events::StoredScheduleEvent;
use crate::domain::session::UserId;
use crate::domain::shift::CanonicalShift;

use super::define_port_error;

define_port_error! {
    /// Errors raised by event store adapters.
    pub enum EventStoreError {
        /// Store connection could not be established.
        Connection { message: String } =>
            "event store connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "event store query failed: {message}",
    }
}

/// One observed canonical day heading into the diff cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationRecord {
    pub user_id: UserId,
    pub schedule_date: NaiveDate,
    pub source_session_id: Uuid,
    pub shifts: Vec<CanonicalShift>,
    pub detected_at: DateTime<Utc>,
}

/// Result of persisting one diff cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationOutcome {
    /// Shift count of the prior snapshot the diff ran against.
    pub previous_shift_count: usize,
    /// Events actually inserted this cycle (dedupe may drop replays).
    pub inserted_event_count: usize,
    /// All stored events for the source session, in detection order.
    pub session_events: Vec<StoredScheduleEvent>,
}

/// Port persisting events and the snapshot atomically per diff cycle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Read the current day snapshot; empty when none exists.
    async fn load_day_snapshot(
        &self,
        user_id: UserId,
        schedule_date: NaiveDate,
    ) -> Result<Vec<CanonicalShift>, EventStoreError>;

    /// Diff the observation against the snapshot, insert deduped events,
    /// and upsert the snapshot, all in one transaction.
    async fn record_observation(
        &self,
        observation: ObservationRecord,
    ) -> Result<ObservationOutcome, EventStoreError>;
}

/// Fixture implementation with no history.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureEventStore;

#[async_trait]
impl EventStore for FixtureEventStore {
    async fn load_day_snapshot(
        &self,
        _user_id: UserId,
        _schedule_date: NaiveDate,
    ) -> Result<Vec<CanonicalShift>, EventStoreError> {
        Ok(Vec::new())
    }

    async fn record_observation(
        &self,
        _observation: ObservationRecord,
    ) -> Result<ObservationOutcome, EventStoreError> {
        Ok(ObservationOutcome {
            previous_shift_count: 0,
            inserted_event_count: 0,
            session_events: Vec::new(),
        })
    }
}
