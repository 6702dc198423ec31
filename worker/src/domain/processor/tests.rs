//! Behaviour coverage for the session processor against mocked ports.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Utc};
use mockable::Clock;
use rstest::rstest;
use uuid::Uuid;

use crate::domain::events::{ScheduleEventType, StoredScheduleEvent};
use crate::domain::layout::TextBox;
use crate::domain::ports::{
    MockEventStore, MockImageStore, MockNotificationRepository, MockOcrEngine,
    MockSessionRepository, MockVersionRepository, ObservationOutcome, OcrEngineError,
    VersionWriteOutcome,
};
use crate::domain::session::{CaptureImage, ClaimedSession, LeaseGuard, UserId};
use crate::domain::shift::{CanonicalShift, ShiftType};
use crate::domain::time_of_day::TimeOfDay;

use super::{SessionProcessor, SessionProcessorConfig, SessionProcessorPorts};

#[derive(Debug, Clone, Copy)]
struct FixtureClock {
    utc_now: DateTime<Utc>,
}

impl Clock for FixtureClock {
    fn local(&self) -> DateTime<Local> {
        self.utc_now.with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        self.utc_now
    }
}

fn fixture_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn claimed_session() -> ClaimedSession {
    ClaimedSession {
        id: Uuid::from_u128(1),
        user_id: UserId::new(7),
        created_at: fixture_now(),
        locked_at: fixture_now(),
        locked_by: "worker-1".to_owned(),
    }
}

fn capture_image() -> CaptureImage {
    CaptureImage {
        id: Uuid::from_u128(2),
        session_id: Uuid::from_u128(1),
        sequence: 1,
        blob_key: "user-7/001.json".to_owned(),
        created_at: fixture_now(),
    }
}

fn text_box(text: &str, y: f64) -> TextBox {
    TextBox {
        text: text.to_owned(),
        x: 10.0,
        y,
        w: 220.0,
        h: 20.0,
        confidence: 0.97,
    }
}

/// A header plus one card that parses into a single Acme home visit.
fn schedule_boxes() -> Vec<TextBox> {
    vec![
        text_box("Monday 2 March 2026", 10.0),
        text_box("10:00 - 14:00", 300.0),
        text_box("Acme AB • Hemstädning", 328.0),
        text_box("Storgatan 5 412 63 Göteborg", 356.0),
        text_box("Göteborg", 384.0),
    ]
}

fn stored_added_event() -> StoredScheduleEvent {
    StoredScheduleEvent {
        event_id: Uuid::from_u128(10),
        user_id: UserId::new(7),
        schedule_date: fixture_now().date_naive(),
        event_type: ScheduleEventType::Added,
        location_fingerprint: "loc".to_owned(),
        customer_fingerprint: "cust".to_owned(),
        old_value: None,
        new_value: Some(CanonicalShift {
            start: TimeOfDay::parse("10:00").expect("valid time"),
            end: TimeOfDay::parse("14:00").expect("valid time"),
            customer_name: "Acme".to_owned(),
            street: "Storgatan".to_owned(),
            street_number: "5".to_owned(),
            postal_code: "412 63".to_owned(),
            postal_area: "Goteborg".to_owned(),
            city: "Goteborg".to_owned(),
            shift_type: ShiftType::HomeVisit,
            location_fingerprint: "loc".to_owned(),
            customer_fingerprint: "cust".to_owned(),
        }),
        detected_at: fixture_now(),
        source_session_id: Uuid::from_u128(1),
    }
}

struct MockPorts {
    sessions: MockSessionRepository,
    versions: MockVersionRepository,
    events: MockEventStore,
    notifications: MockNotificationRepository,
    images: MockImageStore,
    ocr: MockOcrEngine,
}

impl MockPorts {
    fn new() -> Self {
        Self {
            sessions: MockSessionRepository::new(),
            versions: MockVersionRepository::new(),
            events: MockEventStore::new(),
            notifications: MockNotificationRepository::new(),
            images: MockImageStore::new(),
            ocr: MockOcrEngine::new(),
        }
    }

    fn into_processor(self) -> SessionProcessor {
        SessionProcessor::new(
            SessionProcessorPorts {
                sessions: Arc::new(self.sessions),
                versions: Arc::new(self.versions),
                events: Arc::new(self.events),
                notifications: Arc::new(self.notifications),
                images: Arc::new(self.images),
                ocr: Arc::new(self.ocr),
            },
            Arc::new(FixtureClock {
                utc_now: fixture_now(),
            }),
            SessionProcessorConfig {
                heartbeat_interval: Duration::from_secs(10),
                summary_threshold: 3,
                time_tolerance_minutes: 5,
                default_schedule_year: None,
            },
        )
    }
}

#[rstest]
#[tokio::test]
async fn idle_iteration_reports_no_activity() {
    let mut ports = MockPorts::new();
    ports
        .sessions
        .expect_count_sessions_waiting_for_idle()
        .returning(|_| Ok(2));
    ports
        .sessions
        .expect_claim_next_session()
        .returning(|_| Ok(None));

    let report = ports
        .into_processor()
        .run_iteration()
        .await
        .expect("iteration succeeds");
    assert!(!report.has_activity());
    assert_eq!(report.sessions_waiting_for_idle, 2);
}

#[rstest]
#[tokio::test]
async fn processed_session_runs_the_full_pipeline_and_finalizes() {
    let mut ports = MockPorts::new();
    ports
        .sessions
        .expect_count_sessions_waiting_for_idle()
        .returning(|_| Ok(0));
    ports
        .sessions
        .expect_claim_next_session()
        .returning(|_| Ok(Some(claimed_session())));
    ports
        .sessions
        .expect_load_session_images()
        .returning(|_| Ok(vec![capture_image()]));
    ports.sessions.expect_heartbeat().returning(|_, _| Ok(LeaseGuard::Held));
    ports
        .sessions
        .expect_mark_session_done()
        .times(1)
        .returning(|_| Ok(LeaseGuard::Held));
    ports
        .images
        .expect_fetch_image()
        .returning(|_| Ok(Vec::new()));
    ports.ocr.expect_recognize().returning(|_| Ok(schedule_boxes()));
    ports
        .versions
        .expect_record_version()
        .times(1)
        .withf(|version| {
            version.user_id == UserId::new(7)
                && version.payload.contains("\"schedule_date\":\"2026-03-02\"")
                && version.payload_hash.len() == 64
        })
        .returning(|_| Ok(VersionWriteOutcome::Created { version: 1 }));
    ports
        .events
        .expect_record_observation()
        .times(1)
        .withf(|observation| {
            observation.shifts.len() == 1 && observation.shifts[0].customer_name == "Acme"
        })
        .returning(|_| {
            Ok(ObservationOutcome {
                previous_shift_count: 0,
                inserted_event_count: 1,
                session_events: vec![stored_added_event()],
            })
        });
    ports
        .notifications
        .expect_already_notified_event_ids()
        .returning(|_, _| Ok(Default::default()));
    ports
        .notifications
        .expect_store_notifications()
        .times(1)
        .withf(|notifications, _| notifications.len() == 1)
        .returning(|notifications, _| Ok(notifications.len() as u64));

    let report = ports
        .into_processor()
        .run_iteration()
        .await
        .expect("iteration succeeds");
    assert_eq!(report.processed_sessions, 1);
    assert_eq!(report.failed_sessions, 0);
    assert_eq!(report.generated_notifications, 1);
    assert_eq!(report.stored_notifications, 1);
}

#[rstest]
#[tokio::test]
async fn ocr_failure_marks_the_session_failed_with_stage_text() {
    let mut ports = MockPorts::new();
    ports
        .sessions
        .expect_count_sessions_waiting_for_idle()
        .returning(|_| Ok(0));
    ports
        .sessions
        .expect_claim_next_session()
        .returning(|_| Ok(Some(claimed_session())));
    ports
        .sessions
        .expect_load_session_images()
        .returning(|_| Ok(vec![capture_image()]));
    ports.sessions.expect_heartbeat().returning(|_, _| Ok(LeaseGuard::Held));
    ports
        .images
        .expect_fetch_image()
        .returning(|_| Ok(Vec::new()));
    ports
        .ocr
        .expect_recognize()
        .returning(|_| Err(OcrEngineError::recognition("engine crashed")));
    ports
        .sessions
        .expect_mark_session_failed()
        .times(1)
        .withf(|_, error| !error.is_empty() && error.contains("engine crashed"))
        .returning(|_, _| Ok(LeaseGuard::Held));

    let report = ports
        .into_processor()
        .run_iteration()
        .await
        .expect("iteration succeeds");
    assert_eq!(report.failed_sessions, 1);
    assert_eq!(report.processed_sessions, 0);
}

#[rstest]
#[tokio::test]
async fn session_without_images_is_a_schema_contract_failure() {
    let mut ports = MockPorts::new();
    ports
        .sessions
        .expect_count_sessions_waiting_for_idle()
        .returning(|_| Ok(0));
    ports
        .sessions
        .expect_claim_next_session()
        .returning(|_| Ok(Some(claimed_session())));
    ports
        .sessions
        .expect_load_session_images()
        .returning(|_| Ok(Vec::new()));
    ports.sessions.expect_heartbeat().returning(|_, _| Ok(LeaseGuard::Held));
    ports
        .sessions
        .expect_mark_session_failed()
        .times(1)
        .withf(|_, error| error.contains("no capture images"))
        .returning(|_, _| Ok(LeaseGuard::Held));

    let report = ports
        .into_processor()
        .run_iteration()
        .await
        .expect("iteration succeeds");
    assert_eq!(report.failed_sessions, 1);
}

#[rstest]
#[tokio::test]
async fn lost_finalize_guard_abandons_without_marking_failed() {
    let mut ports = MockPorts::new();
    ports
        .sessions
        .expect_count_sessions_waiting_for_idle()
        .returning(|_| Ok(0));
    ports
        .sessions
        .expect_claim_next_session()
        .returning(|_| Ok(Some(claimed_session())));
    ports
        .sessions
        .expect_load_session_images()
        .returning(|_| Ok(vec![capture_image()]));
    ports.sessions.expect_heartbeat().returning(|_, _| Ok(LeaseGuard::Held));
    ports
        .images
        .expect_fetch_image()
        .returning(|_| Ok(Vec::new()));
    ports.ocr.expect_recognize().returning(|_| Ok(schedule_boxes()));
    ports
        .versions
        .expect_record_version()
        .returning(|_| Ok(VersionWriteOutcome::Created { version: 1 }));
    ports.events.expect_record_observation().returning(|_| {
        Ok(ObservationOutcome {
            previous_shift_count: 0,
            inserted_event_count: 0,
            session_events: Vec::new(),
        })
    });
    ports
        .notifications
        .expect_already_notified_event_ids()
        .returning(|_, _| Ok(Default::default()));
    ports
        .notifications
        .expect_store_notifications()
        .returning(|_, _| Ok(0));
    // The reclaim raced us at the finish line: no failed transition follows.
    ports
        .sessions
        .expect_mark_session_done()
        .times(1)
        .returning(|_| Ok(LeaseGuard::Lost));
    ports.sessions.expect_mark_session_failed().times(0);

    let report = ports
        .into_processor()
        .run_iteration()
        .await
        .expect("iteration succeeds");
    assert_eq!(report.processed_sessions, 0);
    assert_eq!(report.failed_sessions, 0);
}
