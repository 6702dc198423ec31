//! PostgreSQL-backed `EventStore` implementation using Diesel.
//!
//! One diff cycle is one transaction: load the prior snapshot, diff, insert
//! hash-deduped events, upsert the snapshot. Replays hit the dedupe index
//! and insert nothing, keeping the event history exactly-once per logical
//! change.

use async_trait::async_trait;
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::diff::diff_day;
use crate::domain::events::{shift_value_hash, StoredScheduleEvent};
use crate::domain::ports::{
    EventStore, EventStoreError, ObservationOutcome, ObservationRecord,
};
use crate::domain::session::UserId;
use crate::domain::shift::{CanonicalShift, CanonicalShiftRecord};

use super::diesel_helpers::{map_basic_diesel_error, map_basic_pool_error};
use super::models::{NewDaySnapshotRow, NewScheduleEventRow, ScheduleEventRow};
use super::pool::{DbPool, PoolError};
use super::schema::{day_snapshot, schedule_event};

/// Diesel-backed implementation of the event store port.
#[derive(Clone)]
pub struct DieselEventStore {
    pool: DbPool,
}

impl DieselEventStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> EventStoreError {
    map_basic_pool_error(error, EventStoreError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> EventStoreError {
    map_basic_diesel_error(error, EventStoreError::query, EventStoreError::connection)
}

/// Transaction-internal error: database failures plus payload corruption.
#[derive(Debug)]
enum TxError {
    Db(diesel::result::Error),
    Corrupt(String),
}

impl From<diesel::result::Error> for TxError {
    fn from(error: diesel::result::Error) -> Self {
        Self::Db(error)
    }
}

fn map_tx_error(error: TxError) -> EventStoreError {
    match error {
        TxError::Db(error) => map_diesel_error(error),
        TxError::Corrupt(message) => EventStoreError::query(message),
    }
}

#[async_trait]
impl EventStore for DieselEventStore {
    async fn load_day_snapshot(
        &self,
        user_id: UserId,
        schedule_date: NaiveDate,
    ) -> Result<Vec<CanonicalShift>, EventStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        read_snapshot(&mut conn, user_id.as_i64(), schedule_date)
            .await
            .map_err(map_tx_error)
    }

    async fn record_observation(
        &self,
        observation: ObservationRecord,
    ) -> Result<ObservationOutcome, EventStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let user_id = observation.user_id.as_i64();
        let schedule_date = observation.schedule_date;
        let session_id = observation.source_session_id;
        let detected_at = observation.detected_at;
        let shifts = observation.shifts;

        let (previous_count, inserted, rows) = conn
            .transaction(|conn| {
                async move {
                    let previous = read_snapshot(conn, user_id, schedule_date).await?;
                    let events = diff_day(&previous, &shifts);

                    let mut inserted = 0usize;
                    for event in &events {
                        let row = NewScheduleEventRow {
                            event_id: Uuid::new_v4(),
                            user_id,
                            schedule_date,
                            event_type: event.event_type().as_str().to_owned(),
                            location_fingerprint: event.anchor().location_fingerprint.clone(),
                            customer_fingerprint: event.anchor().customer_fingerprint.clone(),
                            old_value_hash: shift_value_hash(event.old_value()),
                            new_value_hash: shift_value_hash(event.new_value()),
                            old_value: event.old_value().map(shift_to_value),
                            new_value: event.new_value().map(shift_to_value),
                            detected_at,
                            source_session_id: session_id,
                        };
                        inserted += diesel::insert_into(schedule_event::table)
                            .values(&row)
                            .on_conflict_do_nothing()
                            .execute(conn)
                            .await?;
                    }

                    let snapshot_payload = Value::Array(
                        shifts.iter().map(shift_to_value).collect::<Vec<_>>(),
                    );
                    diesel::insert_into(day_snapshot::table)
                        .values(&NewDaySnapshotRow {
                            user_id,
                            schedule_date,
                            snapshot_payload,
                            source_session_id: session_id,
                            updated_at: detected_at,
                        })
                        .on_conflict((day_snapshot::user_id, day_snapshot::schedule_date))
                        .do_update()
                        .set((
                            day_snapshot::snapshot_payload
                                .eq(excluded(day_snapshot::snapshot_payload)),
                            day_snapshot::source_session_id
                                .eq(excluded(day_snapshot::source_session_id)),
                            day_snapshot::updated_at.eq(excluded(day_snapshot::updated_at)),
                        ))
                        .execute(conn)
                        .await?;

                    let rows: Vec<ScheduleEventRow> = schedule_event::table
                        .filter(schedule_event::source_session_id.eq(session_id))
                        .order((
                            schedule_event::detected_at.asc(),
                            schedule_event::event_id.asc(),
                        ))
                        .select(ScheduleEventRow::as_select())
                        .load(conn)
                        .await?;

                    Ok::<_, TxError>((previous.len(), inserted, rows))
                }
                .scope_boxed()
            })
            .await
            .map_err(map_tx_error)?;

        let session_events = rows
            .into_iter()
            .map(row_to_stored_event)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ObservationOutcome {
            previous_shift_count: previous_count,
            inserted_event_count: inserted,
            session_events,
        })
    }
}

async fn read_snapshot(
    conn: &mut AsyncPgConnection,
    user_id: i64,
    schedule_date: NaiveDate,
) -> Result<Vec<CanonicalShift>, TxError> {
    let payload: Option<Value> = day_snapshot::table
        .filter(
            day_snapshot::user_id
                .eq(user_id)
                .and(day_snapshot::schedule_date.eq(schedule_date)),
        )
        .select(day_snapshot::snapshot_payload)
        .first(conn)
        .await
        .optional()?;

    let Some(payload) = payload else {
        return Ok(Vec::new());
    };
    decode_snapshot_payload(payload).map_err(TxError::Corrupt)
}

fn decode_snapshot_payload(payload: Value) -> Result<Vec<CanonicalShift>, String> {
    let records: Vec<CanonicalShiftRecord> = serde_json::from_value(payload)
        .map_err(|err| format!("corrupted day snapshot payload: {err}"))?;
    records
        .into_iter()
        .map(|record| {
            CanonicalShift::try_from(record)
                .map_err(|err| format!("corrupted snapshot shift: {err}"))
        })
        .collect()
}

fn shift_to_value(shift: &CanonicalShift) -> Value {
    serde_json::to_value(CanonicalShiftRecord::from(shift)).unwrap_or(Value::Null)
}

fn row_to_stored_event(row: ScheduleEventRow) -> Result<StoredScheduleEvent, EventStoreError> {
    let decode_side = |value: Option<Value>,
                       side: &str|
     -> Result<Option<CanonicalShift>, EventStoreError> {
        value
            .map(|value| {
                let record: CanonicalShiftRecord =
                    serde_json::from_value(value).map_err(|err| {
                        EventStoreError::query(format!("corrupted event {side} value: {err}"))
                    })?;
                CanonicalShift::try_from(record).map_err(|err| {
                    EventStoreError::query(format!("corrupted event {side} value: {err}"))
                })
            })
            .transpose()
    };

    Ok(StoredScheduleEvent {
        event_id: row.event_id,
        user_id: UserId::new(row.user_id),
        schedule_date: row.schedule_date,
        event_type: row.event_type.parse().map_err(|err| {
            EventStoreError::query(format!("unknown stored event type: {err}"))
        })?,
        location_fingerprint: row.location_fingerprint,
        customer_fingerprint: row.customer_fingerprint,
        old_value: decode_side(row.old_value, "old")?,
        new_value: decode_side(row.new_value, "new")?,
        detected_at: row.detected_at,
        source_session_id: row.source_session_id,
    })
}
