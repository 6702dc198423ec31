//! Domain orchestration service for schedule-session processing.
//!
//! One iteration claims at most one finalizable session, runs the
//! interpretation pipeline (fetch → OCR → layout → normalize → aggregate →
//! canonicalize), persists version, events, snapshot, and notifications
//! through the ports, and finalizes the session under its ownership guard.
//! Every mutation after the claim is either guarded by the lease or
//! idempotent under a dedupe key, so a reclaimed or replayed session never
//! double-writes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use mockable::Clock;
use tracing::{error, info};

use crate::config::SERVICE_NAME;
use crate::domain::aggregate::{aggregate_session_shifts, AggregationConfig};
use crate::domain::canonical::{canonicalize_day, CanonicalDay};
use crate::domain::error::{truncate_error_text, WorkerError, WorkerStage};
use crate::domain::layout::parse_layout;
use crate::domain::normalize::normalize_entries;
use crate::domain::notification_rules::{build_notifications, NotificationType};
use crate::domain::ports::{
    EventStore, ImageStore, NewScheduleVersion, NotificationRepository, ObservationRecord,
    OcrEngine, SessionRepository, VersionRepository,
};
use crate::domain::schedule_date::{detect_schedule_date, resolve_session_date};
use crate::domain::session::{ClaimedSession, LeaseGuard};
use crate::domain::shift::CanonicalShift;

mod heartbeat;

pub use heartbeat::LeaseHeartbeat;

/// Maximum characters of failure text stored on a session row.
const ERROR_TEXT_LIMIT: usize = 4000;

/// Port bundle required by the session processor.
#[derive(Clone)]
pub struct SessionProcessorPorts {
    pub sessions: Arc<dyn SessionRepository>,
    pub versions: Arc<dyn VersionRepository>,
    pub events: Arc<dyn EventStore>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub images: Arc<dyn ImageStore>,
    pub ocr: Arc<dyn OcrEngine>,
}

/// Processor tunables; lease timings live in the session repository adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProcessorConfig {
    /// Heartbeat period; must satisfy `3 * heartbeat < lease timeout`.
    pub heartbeat_interval: Duration,
    /// Event count at which individual notifications collapse to a summary.
    pub summary_threshold: usize,
    /// Aggregator merge tolerance in minutes.
    pub time_tolerance_minutes: u16,
    /// Year assumed for date headers that omit one.
    pub default_schedule_year: Option<i32>,
}

impl Default for SessionProcessorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            summary_threshold: 3,
            time_tolerance_minutes: 5,
            default_schedule_year: None,
        }
    }
}

/// Counters from one poll iteration, feeding the loop's activity logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationReport {
    pub processed_sessions: usize,
    pub failed_sessions: usize,
    pub generated_notifications: usize,
    pub stored_notifications: u64,
    pub sessions_waiting_for_idle: u64,
}

impl IterationReport {
    /// True when the iteration did observable work.
    pub fn has_activity(&self) -> bool {
        self.processed_sessions > 0
            || self.failed_sessions > 0
            || self.generated_notifications > 0
            || self.stored_notifications > 0
    }
}

struct SessionOutcome {
    schedule_date: NaiveDate,
    version: i32,
    event_count: usize,
    generated_notifications: usize,
    stored_notifications: u64,
}

/// Domain-owned session processor.
pub struct SessionProcessor {
    ports: SessionProcessorPorts,
    clock: Arc<dyn Clock>,
    config: SessionProcessorConfig,
}

impl SessionProcessor {
    pub fn new(
        ports: SessionProcessorPorts,
        clock: Arc<dyn Clock>,
        config: SessionProcessorConfig,
    ) -> Self {
        Self {
            ports,
            clock,
            config,
        }
    }

    /// Run one poll iteration: claim at most one session and process it.
    pub async fn run_iteration(&self) -> Result<IterationReport, WorkerError> {
        let now = self.clock.utc();
        let mut report = IterationReport::default();

        report.sessions_waiting_for_idle = self
            .ports
            .sessions
            .count_sessions_waiting_for_idle(now)
            .await
            .map_err(|e| WorkerError::transient_db(WorkerStage::Db, e.to_string()))?;
        if report.sessions_waiting_for_idle > 0 {
            info!(
                service = SERVICE_NAME,
                event = "session.skipped_idle",
                skipped_session_count = report.sessions_waiting_for_idle,
                "sessions still inside their idle window"
            );
        }

        let Some(session) = self
            .ports
            .sessions
            .claim_next_session(now)
            .await
            .map_err(|e| WorkerError::transient_db(WorkerStage::Db, e.to_string()))?
        else {
            return Ok(report);
        };

        info!(
            service = SERVICE_NAME,
            event = "session.finalized",
            session_id = %session.id,
            user_id = session.user_id.as_i64(),
            correlation_id = %session.id,
            locked_by = %session.locked_by,
            "claimed session for processing"
        );

        let heartbeat = LeaseHeartbeat::spawn(
            Arc::clone(&self.ports.sessions),
            Arc::clone(&self.clock),
            session.id,
            self.config.heartbeat_interval,
        );
        let result = self.process_claimed(&session, &heartbeat).await;
        heartbeat.stop();

        match result {
            Ok(outcome) => {
                match self
                    .ports
                    .sessions
                    .mark_session_done(session.id)
                    .await
                    .map_err(|e| WorkerError::transient_db(WorkerStage::Db, e.to_string()))?
                {
                    LeaseGuard::Held => {
                        report.processed_sessions = 1;
                        report.generated_notifications = outcome.generated_notifications;
                        report.stored_notifications = outcome.stored_notifications;
                        info!(
                            service = SERVICE_NAME,
                            event = "session.processed",
                            session_id = %session.id,
                            user_id = session.user_id.as_i64(),
                            correlation_id = %session.id,
                            schedule_date = %outcome.schedule_date,
                            version = outcome.version,
                            event_count = outcome.event_count,
                            notification_count = outcome.generated_notifications,
                            "session processed"
                        );
                    }
                    LeaseGuard::Lost => {
                        self.log_failure(
                            &session,
                            &WorkerError::lease_lost("finalize guard matched zero rows"),
                            false,
                        );
                    }
                }
            }
            Err(error @ WorkerError::LeaseLost { .. }) => {
                // Another worker owns the session now; leave every row alone.
                self.log_failure(&session, &error, false);
            }
            Err(error) => {
                report.failed_sessions = 1;
                let text = truncate_error_text(&error.to_string(), ERROR_TEXT_LIMIT);
                let marked = self
                    .ports
                    .sessions
                    .mark_session_failed(session.id, &text)
                    .await;
                let marked_failed = matches!(marked, Ok(LeaseGuard::Held));
                self.log_failure(&session, &error, marked_failed);
            }
        }

        Ok(report)
    }

    async fn process_claimed(
        &self,
        session: &ClaimedSession,
        heartbeat: &LeaseHeartbeat,
    ) -> Result<SessionOutcome, WorkerError> {
        let images = self
            .ports
            .sessions
            .load_session_images(session.id)
            .await
            .map_err(|e| WorkerError::transient_db(WorkerStage::Db, e.to_string()))?;
        if images.is_empty() {
            return Err(WorkerError::schema_contract(
                WorkerStage::Lifecycle,
                format!("session {} has no capture images", session.id),
            ));
        }

        let mut image_shifts: Vec<Vec<CanonicalShift>> = Vec::new();
        let mut image_dates: Vec<NaiveDate> = Vec::new();
        let mut total_boxes = 0usize;
        for image in &images {
            let bytes = self
                .ports
                .images
                .fetch_image(&image.blob_key)
                .await
                .map_err(|e| WorkerError::external(WorkerStage::Ocr, e.to_string()))?;
            let boxes = self
                .ports
                .ocr
                .recognize(&bytes)
                .await
                .map_err(|e| WorkerError::external(WorkerStage::Ocr, e.to_string()))?;
            total_boxes += boxes.len();

            let date = detect_schedule_date(&boxes, self.config.default_schedule_year)
                .map_err(|e| WorkerError::schema_contract(WorkerStage::Layout, e.to_string()))?;
            let entries = parse_layout(&boxes);
            let shifts = normalize_entries(&entries)
                .map_err(|e| WorkerError::external(WorkerStage::Layout, e.to_string()))?;
            image_dates.push(date);
            image_shifts.push(shifts);
        }

        info!(
            service = SERVICE_NAME,
            event = "ocr.completed",
            session_id = %session.id,
            user_id = session.user_id.as_i64(),
            correlation_id = %session.id,
            image_count = images.len(),
            text_block_count = total_boxes,
            "ocr finished for all session images"
        );

        let schedule_date = resolve_session_date(&image_dates)
            .map_err(|e| WorkerError::schema_contract(WorkerStage::Layout, e.to_string()))?;
        let input_shift_count: usize = image_shifts.iter().map(Vec::len).sum();
        info!(
            service = SERVICE_NAME,
            event = "layout.shifts_detected",
            session_id = %session.id,
            user_id = session.user_id.as_i64(),
            correlation_id = %session.id,
            shift_count = input_shift_count,
            schedule_date = %schedule_date,
            "layout parsing finished"
        );

        let aggregated = aggregate_session_shifts(
            &image_shifts,
            AggregationConfig {
                time_tolerance_minutes: self.config.time_tolerance_minutes,
            },
        )?;
        info!(
            service = SERVICE_NAME,
            event = "aggregation.completed",
            session_id = %session.id,
            user_id = session.user_id.as_i64(),
            correlation_id = %session.id,
            input_shift_count = input_shift_count,
            output_shift_count = aggregated.len(),
            "aggregated session observations"
        );

        let canonical: CanonicalDay =
            canonicalize_day(&schedule_date.format("%Y-%m-%d").to_string(), &aggregated)?;

        self.ensure_lease(heartbeat)?;
        let version_outcome = self
            .ports
            .versions
            .record_version(NewScheduleVersion {
                user_id: session.user_id,
                schedule_date: canonical.schedule_date,
                session_id: session.id,
                payload: canonical.payload.clone(),
                payload_hash: canonical.payload_hash.clone(),
            })
            .await
            .map_err(|e| WorkerError::transient_db(WorkerStage::Db, e.to_string()))?;

        self.ensure_lease(heartbeat)?;
        let observation = self
            .ports
            .events
            .record_observation(ObservationRecord {
                user_id: session.user_id,
                schedule_date: canonical.schedule_date,
                source_session_id: session.id,
                shifts: canonical.shifts.clone(),
                detected_at: self.clock.utc(),
            })
            .await
            .map_err(|e| WorkerError::transient_db(WorkerStage::Db, e.to_string()))?;

        let event_types = event_type_breakdown(&observation.session_events);
        info!(
            service = SERVICE_NAME,
            event = "diff.computed",
            session_id = %session.id,
            user_id = session.user_id.as_i64(),
            correlation_id = %session.id,
            old_shift_count = observation.previous_shift_count,
            new_shift_count = canonical.shifts.len(),
            event_count = observation.inserted_event_count,
            "diffed observation against prior snapshot"
        );
        info!(
            service = SERVICE_NAME,
            event = "events.persisted",
            session_id = %session.id,
            user_id = session.user_id.as_i64(),
            correlation_id = %session.id,
            event_count = observation.session_events.len(),
            event_types = %event_types,
            "events and snapshot persisted"
        );

        let already_notified = self
            .ports
            .notifications
            .already_notified_event_ids(session.user_id, canonical.schedule_date)
            .await
            .map_err(|e| WorkerError::transient_db(WorkerStage::Db, e.to_string()))?;
        let notifications = build_notifications(
            &observation.session_events,
            self.config.summary_threshold,
            &already_notified,
        );
        let summary_used = notifications
            .iter()
            .any(|n| n.notification_type == NotificationType::Summary);
        info!(
            service = SERVICE_NAME,
            event = "notifications.generated",
            session_id = %session.id,
            user_id = session.user_id.as_i64(),
            correlation_id = %session.id,
            notification_count = notifications.len(),
            summary_used = summary_used,
            "notifications generated"
        );

        self.ensure_lease(heartbeat)?;
        let stored = self
            .ports
            .notifications
            .store_notifications(&notifications, self.clock.utc())
            .await
            .map_err(|e| WorkerError::transient_db(WorkerStage::Db, e.to_string()))?;
        info!(
            service = SERVICE_NAME,
            event = "notifications.stored",
            session_id = %session.id,
            user_id = session.user_id.as_i64(),
            correlation_id = %session.id,
            notification_count = notifications.len(),
            stored_count = stored,
            "notifications persisted"
        );

        Ok(SessionOutcome {
            schedule_date: canonical.schedule_date,
            version: version_outcome.version(),
            event_count: observation.session_events.len(),
            generated_notifications: notifications.len(),
            stored_notifications: stored,
        })
    }

    /// Abort before any ownership-sensitive write once the lease is gone.
    fn ensure_lease(&self, heartbeat: &LeaseHeartbeat) -> Result<(), WorkerError> {
        if heartbeat.is_lost() {
            Err(WorkerError::lease_lost(
                "heartbeat reported the lease reclaimed",
            ))
        } else {
            Ok(())
        }
    }

    fn log_failure(&self, session: &ClaimedSession, error: &WorkerError, marked_failed: bool) {
        error!(
            service = SERVICE_NAME,
            event = "session.failed",
            session_id = %session.id,
            user_id = session.user_id.as_i64(),
            correlation_id = %session.id,
            error.r#type = error.kind_name(),
            error.message = %error,
            error.stage = error.stage().as_str(),
            marked_failed = marked_failed,
            "session processing failed"
        );
    }
}

fn event_type_breakdown(
    events: &[crate::domain::events::StoredScheduleEvent],
) -> String {
    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    for event in events {
        *counts.entry(event.event_type.as_str()).or_default() += 1;
    }
    let mut pairs: Vec<(&str, usize)> = counts.into_iter().collect();
    pairs.sort_unstable();
    pairs
        .iter()
        .map(|(name, count)| format!("{name}:{count}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests;
