//! PostgreSQL-backed `VersionRepository` implementation using Diesel.
//!
//! Version inserts for one `(user_id, schedule_date)` are serialized by a
//! transactional advisory lock so concurrent writers cannot interleave
//! reads of the latest version with their inserts. The conflict-ignored
//! insert distinguishes a retry that already wrote its row from a fresh
//! version.

use async_trait::async_trait;
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::BigInt;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::ports::{
    NewScheduleVersion, VersionRepository, VersionRepositoryError, VersionWriteOutcome,
};

use super::diesel_helpers::{map_basic_diesel_error, map_basic_pool_error};
use super::models::NewScheduleVersionRow;
use super::pool::{DbPool, PoolError};
use super::schema::schedule_version;

/// Diesel-backed implementation of the version repository port.
#[derive(Clone)]
pub struct DieselVersionRepository {
    pool: DbPool,
}

impl DieselVersionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> VersionRepositoryError {
    map_basic_pool_error(error, VersionRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> VersionRepositoryError {
    map_basic_diesel_error(
        error,
        VersionRepositoryError::query,
        VersionRepositoryError::connection,
    )
}

/// Advisory lock key for one `(user_id, schedule_date)` day.
///
/// The first eight bytes of the SHA-256 digest, interpreted big-endian.
fn advisory_lock_key(user_id: i64, schedule_date: NaiveDate) -> i64 {
    let mut hasher = Sha256::new();
    hasher.update(format!("{user_id}|{}", schedule_date.format("%Y-%m-%d")).as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

#[async_trait]
impl VersionRepository for DieselVersionRepository {
    async fn record_version(
        &self,
        version: NewScheduleVersion,
    ) -> Result<VersionWriteOutcome, VersionRepositoryError> {
        let payload: serde_json::Value = serde_json::from_str(&version.payload)
            .map_err(|err| {
                VersionRepositoryError::query(format!("payload is not valid JSON: {err}"))
            })?;

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let user_id = version.user_id.as_i64();
        let schedule_date = version.schedule_date;
        let session_id = version.session_id;
        let payload_hash = version.payload_hash.clone();
        let lock_key = advisory_lock_key(user_id, schedule_date);

        conn.transaction(|conn| {
            async move {
                sql_query("SELECT pg_advisory_xact_lock($1)")
                    .bind::<BigInt, _>(lock_key)
                    .execute(conn)
                    .await?;

                let latest: Option<(i32, String)> = schedule_version::table
                    .filter(
                        schedule_version::user_id
                            .eq(user_id)
                            .and(schedule_version::schedule_date.eq(schedule_date)),
                    )
                    .order(schedule_version::version.desc())
                    .select((schedule_version::version, schedule_version::payload_hash))
                    .first(conn)
                    .await
                    .optional()?;

                if let Some((current, hash)) = &latest {
                    if *hash == payload_hash {
                        return Ok(VersionWriteOutcome::Unchanged { version: *current });
                    }
                }

                let next = latest.map_or(1, |(current, _)| current + 1);
                let inserted = diesel::insert_into(schedule_version::table)
                    .values(&NewScheduleVersionRow {
                        user_id,
                        schedule_date,
                        version: next,
                        session_id,
                        payload,
                        payload_hash,
                    })
                    .on_conflict_do_nothing()
                    .execute(conn)
                    .await?;

                if inserted == 0 {
                    // A previous attempt for this session already won.
                    let existing = existing_session_version(conn, session_id).await?;
                    Ok(VersionWriteOutcome::AlreadyExisted {
                        version: existing.unwrap_or(next),
                    })
                } else {
                    Ok(VersionWriteOutcome::Created { version: next })
                }
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel_error)
    }
}

async fn existing_session_version(
    conn: &mut diesel_async::AsyncPgConnection,
    session_id: Uuid,
) -> Result<Option<i32>, diesel::result::Error> {
    schedule_version::table
        .filter(schedule_version::session_id.eq(session_id))
        .select(schedule_version::version)
        .first(conn)
        .await
        .optional()
}
