//! Periodic worker loop driving the session processor.
//!
//! One long-lived process, one iteration per poll interval, at most one
//! session per iteration. Iteration failures are logged and the loop keeps
//! going; shutdown leaves any in-flight lease to expire and be reclaimed.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::config::SERVICE_NAME;
use crate::domain::processor::SessionProcessor;

/// Loop driver around [`SessionProcessor::run_iteration`].
pub struct Runner {
    processor: Arc<SessionProcessor>,
    poll_interval: Duration,
    idle_log_every: u32,
}

impl Runner {
    pub fn new(processor: Arc<SessionProcessor>, poll_interval: Duration, idle_log_every: u32) -> Self {
        Self {
            processor,
            poll_interval,
            idle_log_every: idle_log_every.max(1),
        }
    }

    /// Run until the process receives ctrl-c.
    pub async fn run_until_shutdown(&self) {
        let mut idle_streak: u32 = 0;
        loop {
            match self.processor.run_iteration().await {
                Ok(report) => {
                    if report.has_activity() {
                        idle_streak = 0;
                        info!(
                            service = SERVICE_NAME,
                            event = "worker.iteration.finish",
                            processed_sessions = report.processed_sessions,
                            failed_sessions = report.failed_sessions,
                            generated_notifications = report.generated_notifications,
                            stored_notifications = report.stored_notifications,
                            "iteration finished"
                        );
                    } else {
                        idle_streak = idle_streak.saturating_add(1);
                        if should_log_idle_iteration(idle_streak, self.idle_log_every) {
                            info!(
                                service = SERVICE_NAME,
                                event = "worker.iteration.idle",
                                idle_iteration_streak = idle_streak,
                                poll_seconds = self.poll_interval.as_secs(),
                                "no finalizable sessions"
                            );
                        }
                    }
                }
                Err(err) => {
                    idle_streak = 0;
                    error!(
                        service = SERVICE_NAME,
                        event = "worker.iteration.error",
                        error.r#type = err.kind_name(),
                        error.message = %err,
                        error.stage = err.stage().as_str(),
                        "iteration failed"
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!(
                        service = SERVICE_NAME,
                        event = "worker.shutdown",
                        "shutdown signal received; leaving in-flight leases to expire"
                    );
                    return;
                }
            }
        }
    }
}

/// Log the first idle iteration, then every `idle_log_every`th.
fn should_log_idle_iteration(idle_streak: u32, idle_log_every: u32) -> bool {
    match idle_streak {
        0 => false,
        1 => true,
        streak => streak % idle_log_every == 0,
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, false)]
    #[case(1, true)]
    #[case(2, false)]
    #[case(12, true)]
    #[case(24, true)]
    #[case(25, false)]
    fn idle_logging_is_throttled(#[case] streak: u32, #[case] expected: bool) {
        assert_eq!(should_log_idle_iteration(streak, 12), expected);
    }
}
