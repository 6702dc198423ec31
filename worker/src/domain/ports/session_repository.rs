//! Port for capture-session lifecycle storage: claim, heartbeat, finalize.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::session::{CaptureImage, ClaimedSession, LeaseGuard};

use super::define_port_error;

define_port_error! {
    /// Errors raised by session repository adapters.
    pub enum SessionRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "session repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "session repository query failed: {message}",
    }
}

/// Port for claiming sessions and applying ownership-guarded transitions.
///
/// The adapter owns the claim predicate (idle gate, stale-lease reclaim) and
/// is configured with the lease timings and state names; callers only supply
/// the observation instant.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Atomically claim the next finalizable or stale-leased session.
    ///
    /// Losers of a concurrent race observe `None`.
    async fn claim_next_session(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<ClaimedSession>, SessionRepositoryError>;

    /// Count pending sessions still inside their idle window.
    async fn count_sessions_waiting_for_idle(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, SessionRepositoryError>;

    /// Load a session's screenshots ordered by sequence.
    async fn load_session_images(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<CaptureImage>, SessionRepositoryError>;

    /// Refresh the lease timestamp; `Lost` means another worker owns it now.
    async fn heartbeat(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<LeaseGuard, SessionRepositoryError>;

    /// Transition an owned session to done, clearing the lease.
    async fn mark_session_done(
        &self,
        session_id: Uuid,
    ) -> Result<LeaseGuard, SessionRepositoryError>;

    /// Transition an owned session to failed with a non-empty error text.
    async fn mark_session_failed(
        &self,
        session_id: Uuid,
        error: &str,
    ) -> Result<LeaseGuard, SessionRepositoryError>;
}

/// Fixture implementation for tests that never touch session storage.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureSessionRepository;

#[async_trait]
impl SessionRepository for FixtureSessionRepository {
    async fn claim_next_session(
        &self,
        _now: DateTime<Utc>,
    ) -> Result<Option<ClaimedSession>, SessionRepositoryError> {
        Ok(None)
    }

    async fn count_sessions_waiting_for_idle(
        &self,
        _now: DateTime<Utc>,
    ) -> Result<u64, SessionRepositoryError> {
        Ok(0)
    }

    async fn load_session_images(
        &self,
        _session_id: Uuid,
    ) -> Result<Vec<CaptureImage>, SessionRepositoryError> {
        Ok(Vec::new())
    }

    async fn heartbeat(
        &self,
        _session_id: Uuid,
        _now: DateTime<Utc>,
    ) -> Result<LeaseGuard, SessionRepositoryError> {
        Ok(LeaseGuard::Held)
    }

    async fn mark_session_done(
        &self,
        _session_id: Uuid,
    ) -> Result<LeaseGuard, SessionRepositoryError> {
        Ok(LeaseGuard::Held)
    }

    async fn mark_session_failed(
        &self,
        _session_id: Uuid,
        _error: &str,
    ) -> Result<LeaseGuard, SessionRepositoryError> {
        Ok(LeaseGuard::Held)
    }
}
