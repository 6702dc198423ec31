//! Diesel table definitions for the schedule-ingest schema.
//!
//! These definitions must match the shared migrations exactly; the upstream
//! producer owns the migrations, this worker only consumes the tables.
//! Tables live in the schema configured via `DB_SCHEMA`, which the pool pins
//! as the connection `search_path`, so no schema prefix appears here.
//!
//! `capture_session` is deliberately absent: its `state` column is a
//! database enum and the claim needs `FOR UPDATE SKIP LOCKED`, so every
//! access goes through raw SQL in the session repository.

diesel::table! {
    /// Ordered screenshots belonging to a capture session. Read-only here.
    capture_image (id) {
        id -> Uuid,
        session_id -> Uuid,
        /// 1-based position within the session; unique per session.
        sequence -> Int4,
        /// Object-storage key of the screenshot; globally unique.
        r2_key -> Text,
        telegram_message_id -> Nullable<Int8>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Immutable per-session canonical payload history.
    schedule_version (user_id, schedule_date, version) {
        user_id -> Int8,
        schedule_date -> Date,
        /// Dense sequence starting at 1 per (user_id, schedule_date).
        version -> Int4,
        /// Producing session; unique, which caps each session at one row.
        session_id -> Uuid,
        payload -> Jsonb,
        payload_hash -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Latest canonical day state; the diff baseline.
    day_snapshot (user_id, schedule_date) {
        user_id -> Int8,
        schedule_date -> Date,
        snapshot_payload -> Jsonb,
        source_session_id -> Uuid,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Immutable semantic change records, deduped by value hashes.
    schedule_event (event_id) {
        event_id -> Uuid,
        user_id -> Int8,
        schedule_date -> Date,
        event_type -> Text,
        location_fingerprint -> Text,
        customer_fingerprint -> Text,
        old_value_hash -> Text,
        new_value_hash -> Text,
        old_value -> Nullable<Jsonb>,
        new_value -> Nullable<Jsonb>,
        detected_at -> Timestamptz,
        source_session_id -> Uuid,
    }
}

diesel::table! {
    /// Outbound notifications; delivery columns belong to the sender.
    schedule_notification (notification_id) {
        notification_id -> Text,
        user_id -> Int8,
        schedule_date -> Date,
        source_session_id -> Uuid,
        status -> Text,
        notification_type -> Text,
        message -> Text,
        event_ids -> Jsonb,
        created_at -> Timestamptz,
        sent_at -> Nullable<Timestamptz>,
    }
}
