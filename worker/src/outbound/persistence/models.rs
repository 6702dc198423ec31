//! Internal Diesel row structs for database operations.
//!
//! Implementation details of the persistence layer; never exposed to the
//! domain. Repository implementations convert between these and domain
//! types so Diesel stays confined to the adapter layer.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel::sql_types::{Int8, Text, Timestamptz, Uuid as SqlUuid};
use serde_json::Value;
use uuid::Uuid;

use super::schema::{capture_image, day_snapshot, schedule_event, schedule_notification, schedule_version};

/// Row struct for reading capture images.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = capture_image)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct CaptureImageRow {
    pub id: Uuid,
    pub session_id: Uuid,
    pub sequence: i32,
    pub r2_key: String,
    pub created_at: DateTime<Utc>,
}

/// Insertable struct for new schedule versions.
///
/// `created_at` defaults to `NOW()` via the schema.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schedule_version)]
pub(crate) struct NewScheduleVersionRow {
    pub user_id: i64,
    pub schedule_date: NaiveDate,
    pub version: i32,
    pub session_id: Uuid,
    pub payload: Value,
    pub payload_hash: String,
}

/// Insertable struct for the day snapshot upsert.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = day_snapshot)]
pub(crate) struct NewDaySnapshotRow {
    pub user_id: i64,
    pub schedule_date: NaiveDate,
    pub snapshot_payload: Value,
    pub source_session_id: Uuid,
    pub updated_at: DateTime<Utc>,
}

/// Insertable struct for new schedule events.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schedule_event)]
pub(crate) struct NewScheduleEventRow {
    pub event_id: Uuid,
    pub user_id: i64,
    pub schedule_date: NaiveDate,
    pub event_type: String,
    pub location_fingerprint: String,
    pub customer_fingerprint: String,
    pub old_value_hash: String,
    pub new_value_hash: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub detected_at: DateTime<Utc>,
    pub source_session_id: Uuid,
}

/// Row struct for reading stored schedule events back.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = schedule_event)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct ScheduleEventRow {
    pub event_id: Uuid,
    pub user_id: i64,
    pub schedule_date: NaiveDate,
    pub event_type: String,
    pub location_fingerprint: String,
    pub customer_fingerprint: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub detected_at: DateTime<Utc>,
    pub source_session_id: Uuid,
}

/// Insertable struct for outbound notifications.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schedule_notification)]
pub(crate) struct NewNotificationRow {
    pub notification_id: String,
    pub user_id: i64,
    pub schedule_date: NaiveDate,
    pub source_session_id: Uuid,
    pub status: String,
    pub notification_type: String,
    pub message: String,
    pub event_ids: Value,
    pub created_at: DateTime<Utc>,
}

/// Raw-SQL row returned by the session claim statement.
#[derive(Debug, Clone, QueryableByName)]
pub(crate) struct ClaimedSessionRow {
    #[diesel(sql_type = SqlUuid)]
    pub id: Uuid,
    #[diesel(sql_type = Int8)]
    pub user_id: i64,
    #[diesel(sql_type = Timestamptz)]
    pub created_at: DateTime<Utc>,
    #[diesel(sql_type = Timestamptz)]
    pub locked_at: DateTime<Utc>,
    #[diesel(sql_type = Text)]
    pub locked_by: String,
}

/// Raw-SQL row returned by the idle-wait count.
#[derive(Debug, Clone, QueryableByName)]
pub(crate) struct WaitingCountRow {
    #[diesel(sql_type = Int8)]
    pub waiting_count: i64,
}
