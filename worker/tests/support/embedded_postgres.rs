//! Embedded PostgreSQL provisioning for worker integration tests.
//!
//! Each suite gets its own temporary database on the shared embedded
//! cluster, pre-loaded with the ingest schema. The upstream producer owns
//! the real migrations; this DDL mirrors them, including the enum-typed
//! session state and the dedupe indexes the adapters rely on.

use pg_embedded_setup_unpriv::{shared_cluster_handle, TemporaryDatabase};
use postgres::{Client, NoTls};

use super::format_postgres_error;

const INGEST_SCHEMA_DDL: &str = r#"
CREATE SCHEMA schedule_ingest;

CREATE TYPE schedule_ingest.session_state AS ENUM
    ('pending', 'processing', 'done', 'failed');

CREATE TABLE schedule_ingest.capture_session (
    id uuid PRIMARY KEY,
    user_id bigint NOT NULL,
    state schedule_ingest.session_state NOT NULL DEFAULT 'pending',
    created_at timestamptz NOT NULL DEFAULT now(),
    error text,
    locked_at timestamptz,
    locked_by text
);

CREATE TABLE schedule_ingest.capture_image (
    id uuid PRIMARY KEY,
    session_id uuid NOT NULL REFERENCES schedule_ingest.capture_session (id),
    sequence integer NOT NULL,
    r2_key text NOT NULL UNIQUE,
    telegram_message_id bigint,
    created_at timestamptz NOT NULL DEFAULT now(),
    UNIQUE (session_id, sequence)
);

CREATE TABLE schedule_ingest.schedule_version (
    user_id bigint NOT NULL,
    schedule_date date NOT NULL,
    version integer NOT NULL,
    session_id uuid NOT NULL UNIQUE,
    payload jsonb NOT NULL,
    payload_hash text NOT NULL,
    created_at timestamptz NOT NULL DEFAULT now(),
    PRIMARY KEY (user_id, schedule_date, version)
);

CREATE TABLE schedule_ingest.day_snapshot (
    user_id bigint NOT NULL,
    schedule_date date NOT NULL,
    snapshot_payload jsonb NOT NULL,
    source_session_id uuid NOT NULL,
    updated_at timestamptz NOT NULL,
    PRIMARY KEY (user_id, schedule_date)
);

CREATE TABLE schedule_ingest.schedule_event (
    event_id uuid PRIMARY KEY,
    user_id bigint NOT NULL,
    schedule_date date NOT NULL,
    event_type text NOT NULL,
    location_fingerprint text NOT NULL,
    customer_fingerprint text NOT NULL,
    old_value_hash text NOT NULL,
    new_value_hash text NOT NULL,
    old_value jsonb,
    new_value jsonb,
    detected_at timestamptz NOT NULL,
    source_session_id uuid NOT NULL
);

CREATE UNIQUE INDEX schedule_event_dedupe_idx
    ON schedule_ingest.schedule_event
    (user_id, schedule_date, location_fingerprint, event_type,
     old_value_hash, new_value_hash);

CREATE TABLE schedule_ingest.schedule_notification (
    notification_id text PRIMARY KEY,
    user_id bigint NOT NULL,
    schedule_date date NOT NULL,
    source_session_id uuid NOT NULL,
    status text NOT NULL,
    notification_type text NOT NULL,
    message text NOT NULL,
    event_ids jsonb NOT NULL,
    created_at timestamptz NOT NULL,
    sent_at timestamptz
);
"#;

/// Create a temporary database on the shared cluster and load the schema.
pub fn provision_worker_database() -> Result<TemporaryDatabase, String> {
    let cluster = shared_cluster_handle().map_err(|err| err.to_string())?;
    let temp_db = cluster
        .create_temporary_database()
        .map_err(|err| err.to_string())?;

    let mut client =
        Client::connect(temp_db.url(), NoTls).map_err(|err| format_postgres_error(&err))?;
    client
        .batch_execute(INGEST_SCHEMA_DDL)
        .map_err(|err| format_postgres_error(&err))?;

    Ok(temp_db)
}
