//! Background lease heartbeat for an in-flight session.
//!
//! The heartbeat runs independently of the processing path so CPU-bound OCR
//! work cannot starve the lease. Its ownership guard is the tie-breaker with
//! stale-lease reclaim: once another worker takes the session, the guarded
//! update matches zero rows and this worker must stop writing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mockable::Clock;
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

use crate::domain::ports::SessionRepository;
use crate::domain::session::LeaseGuard;

/// Handle to a running heartbeat task.
pub struct LeaseHeartbeat {
    lost: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl LeaseHeartbeat {
    /// Spawn a periodic guarded `locked_at` refresh for `session_id`.
    pub fn spawn(
        sessions: Arc<dyn SessionRepository>,
        clock: Arc<dyn Clock>,
        session_id: Uuid,
        interval: Duration,
    ) -> Self {
        let lost = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&lost);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; the claim just set locked_at.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match sessions.heartbeat(session_id, clock.utc()).await {
                    Ok(LeaseGuard::Held) => {}
                    Ok(LeaseGuard::Lost) => {
                        warn!(
                            event = "session.lease_lost",
                            session_id = %session_id,
                            "lease reclaimed by another worker; stopping heartbeat"
                        );
                        flag.store(true, Ordering::SeqCst);
                        return;
                    }
                    Err(error) => {
                        // A transient miss is tolerated; the lease only
                        // expires after several consecutive misses.
                        warn!(
                            event = "session.heartbeat_error",
                            session_id = %session_id,
                            error.message = %error,
                            "heartbeat update failed"
                        );
                    }
                }
            }
        });
        Self { lost, handle }
    }

    /// True once an ownership guard reported the lease gone.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    /// Stop the background task.
    pub fn stop(self) {
        self.handle.abort();
    }
}
