//! PostgreSQL-backed `SessionRepository` implementation using Diesel.
//!
//! The claim, heartbeat, and finalize statements are raw SQL: the claim
//! needs `FOR UPDATE SKIP LOCKED` plus an aggregate idle gate, and the
//! `state` column is a database enum that only coerces from unknown-typed
//! literals. State names come from validated configuration and are embedded
//! as quoted literals; all other values go through typed binds.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::sql_query;
use diesel::sql_types::{Text, Timestamptz, Uuid as SqlUuid};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::domain::ports::{SessionRepository, SessionRepositoryError};
use crate::domain::session::{
    CaptureImage, ClaimedSession, InvalidStateName, LeaseGuard, SessionStateNames, UserId,
};

use super::diesel_helpers::{map_basic_diesel_error, map_basic_pool_error};
use super::models::{CaptureImageRow, ClaimedSessionRow, WaitingCountRow};
use super::pool::{DbPool, PoolError};
use super::schema::capture_image;

/// Lease timings and identity baked into the repository's statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseSettings {
    /// Identity written into `locked_by` and compared by every guard.
    pub worker_id: String,
    /// Age after which a `processing` lease is reclaimable.
    pub lease_timeout: Duration,
    /// Quiet period required after a session's newest image.
    pub idle_timeout: Duration,
    pub states: SessionStateNames,
}

/// Diesel-backed implementation of the session repository port.
#[derive(Clone)]
pub struct DieselSessionRepository {
    pool: DbPool,
    settings: LeaseSettings,
    claim_sql: String,
    waiting_sql: String,
    heartbeat_sql: String,
    done_sql: String,
    failed_sql: String,
}

fn map_pool_error(error: PoolError) -> SessionRepositoryError {
    map_basic_pool_error(error, SessionRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> SessionRepositoryError {
    map_basic_diesel_error(
        error,
        SessionRepositoryError::query,
        SessionRepositoryError::connection,
    )
}

impl DieselSessionRepository {
    /// Build the repository, pre-rendering every guarded statement.
    pub fn new(pool: DbPool, settings: LeaseSettings) -> Result<Self, InvalidStateName> {
        settings.states.validate()?;
        Ok(Self {
            claim_sql: render_claim_sql(&settings.states),
            waiting_sql: render_waiting_sql(&settings.states),
            heartbeat_sql: render_heartbeat_sql(&settings.states),
            done_sql: render_done_sql(&settings.states),
            failed_sql: render_failed_sql(&settings.states),
            pool,
            settings,
        })
    }

    fn idle_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::from_std(self.settings.idle_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(0))
    }

    fn lease_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::from_std(self.settings.lease_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(0))
    }
}

// Pending sessions must pass the idle gate (at least one image, the newest
// older than the cutoff); processing sessions qualify only once their lease
// has expired. Pending wins ties, then age.
fn render_claim_sql(states: &SessionStateNames) -> String {
    format!(
            "UPDATE capture_session \
             SET state = '{processing}', locked_at = $1, locked_by = $2 \
             WHERE id = (\
                 SELECT cs.id FROM capture_session cs \
                 WHERE (\
                     cs.state::text = '{pending}' \
                     AND EXISTS (SELECT 1 FROM capture_image ci WHERE ci.session_id = cs.id) \
                     AND (SELECT MAX(ci.created_at) FROM capture_image ci \
                          WHERE ci.session_id = cs.id) <= $3\
                 ) OR (\
                     cs.state::text = '{processing}' \
                     AND cs.locked_at IS NOT NULL \
                     AND cs.locked_at <= $4\
                 ) \
                 ORDER BY (cs.state::text = '{pending}') DESC, cs.created_at ASC, cs.id ASC \
                 FOR UPDATE SKIP LOCKED \
                 LIMIT 1\
             ) \
             RETURNING id, user_id, created_at, locked_at, locked_by",
        pending = states.pending,
        processing = states.processing,
    )
}

fn render_waiting_sql(states: &SessionStateNames) -> String {
    format!(
            "SELECT COUNT(*) AS waiting_count FROM (\
                 SELECT cs.id FROM capture_session cs \
                 LEFT JOIN capture_image ci ON ci.session_id = cs.id \
                 WHERE cs.state::text = '{pending}' \
                 GROUP BY cs.id \
                 HAVING MAX(ci.created_at) IS NULL OR MAX(ci.created_at) > $1\
             ) waiting",
        pending = states.pending,
    )
}

fn render_heartbeat_sql(states: &SessionStateNames) -> String {
    format!(
        "UPDATE capture_session SET locked_at = $1 \
         WHERE id = $2 AND state::text = '{processing}' AND locked_by = $3",
        processing = states.processing,
    )
}

fn render_done_sql(states: &SessionStateNames) -> String {
    format!(
        "UPDATE capture_session \
         SET state = '{done}', error = NULL, locked_at = NULL, locked_by = NULL \
         WHERE id = $1 AND state::text = '{processing}' AND locked_by = $2",
        done = states.done,
        processing = states.processing,
    )
}

fn render_failed_sql(states: &SessionStateNames) -> String {
    format!(
        "UPDATE capture_session \
         SET state = '{failed}', error = $3, locked_at = NULL, locked_by = NULL \
         WHERE id = $1 AND state::text = '{processing}' AND locked_by = $2",
        failed = states.failed,
        processing = states.processing,
    )
}

#[async_trait]
impl SessionRepository for DieselSessionRepository {
    async fn claim_next_session(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<ClaimedSession>, SessionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: Option<ClaimedSessionRow> = sql_query(self.claim_sql.as_str())
            .bind::<Timestamptz, _>(now)
            .bind::<Text, _>(&self.settings.worker_id)
            .bind::<Timestamptz, _>(self.idle_cutoff(now))
            .bind::<Timestamptz, _>(self.lease_cutoff(now))
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        Ok(row.map(|row| ClaimedSession {
            id: row.id,
            user_id: UserId::new(row.user_id),
            created_at: row.created_at,
            locked_at: row.locked_at,
            locked_by: row.locked_by,
        }))
    }

    async fn count_sessions_waiting_for_idle(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, SessionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: WaitingCountRow = sql_query(self.waiting_sql.as_str())
            .bind::<Timestamptz, _>(self.idle_cutoff(now))
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(row.waiting_count.max(0) as u64)
    }

    async fn load_session_images(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<CaptureImage>, SessionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let rows: Vec<CaptureImageRow> = capture_image::table
            .filter(capture_image::session_id.eq(session_id))
            .order(capture_image::sequence.asc())
            .select(CaptureImageRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        Ok(rows
            .into_iter()
            .map(|row| CaptureImage {
                id: row.id,
                session_id: row.session_id,
                sequence: row.sequence,
                blob_key: row.r2_key,
                created_at: row.created_at,
            })
            .collect())
    }

    async fn heartbeat(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<LeaseGuard, SessionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let updated = sql_query(self.heartbeat_sql.as_str())
            .bind::<Timestamptz, _>(now)
            .bind::<SqlUuid, _>(session_id)
            .bind::<Text, _>(&self.settings.worker_id)
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(guard_from_rows(updated))
    }

    async fn mark_session_done(
        &self,
        session_id: Uuid,
    ) -> Result<LeaseGuard, SessionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let updated = sql_query(self.done_sql.as_str())
            .bind::<SqlUuid, _>(session_id)
            .bind::<Text, _>(&self.settings.worker_id)
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(guard_from_rows(updated))
    }

    async fn mark_session_failed(
        &self,
        session_id: Uuid,
        error: &str,
    ) -> Result<LeaseGuard, SessionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let updated = sql_query(self.failed_sql.as_str())
            .bind::<SqlUuid, _>(session_id)
            .bind::<Text, _>(&self.settings.worker_id)
            .bind::<Text, _>(error)
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(guard_from_rows(updated))
    }
}

fn guard_from_rows(updated: usize) -> LeaseGuard {
    if updated == 0 {
        LeaseGuard::Lost
    } else {
        LeaseGuard::Held
    }
}
