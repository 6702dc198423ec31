//! Integration tests for `DieselNotificationRepository`.
//!
//! This suite validates conflict-ignored inserts on the deterministic
//! notification id and the notified-event-id read against embedded
//! PostgreSQL.

use std::collections::HashSet;

use chrono::{NaiveDate, Utc};
use pg_embedded_setup_unpriv::TemporaryDatabase;
use postgres::{Client, NoTls};
use rstest::{fixture, rstest};
use tokio::runtime::Runtime;
use uuid::Uuid;

use schedule_ingest::domain::notification_rules::{NotificationType, UserNotification};
use schedule_ingest::domain::ports::NotificationRepository;
use schedule_ingest::domain::session::UserId;
use schedule_ingest::outbound::persistence::{DbPool, DieselNotificationRepository, PoolConfig};

mod support;

use support::{format_postgres_error, handle_cluster_setup_failure, provision_worker_database};

const USER: i64 = 7;

struct TestContext {
    runtime: Runtime,
    repository: DieselNotificationRepository,
    database_url: String,
    _database: TemporaryDatabase,
}

fn setup_context() -> Result<TestContext, String> {
    let runtime = Runtime::new().map_err(|err| err.to_string())?;
    let temp_db = provision_worker_database()?;
    let database_url = temp_db.url().to_string();

    let config = PoolConfig::new(database_url.as_str(), "schedule_ingest")
        .with_max_size(2)
        .with_min_idle(Some(1));
    let pool = runtime
        .block_on(async { DbPool::new(config).await })
        .map_err(|err| err.to_string())?;

    Ok(TestContext {
        runtime,
        repository: DieselNotificationRepository::new(pool),
        database_url,
        _database: temp_db,
    })
}

#[fixture]
fn repo_context() -> Option<TestContext> {
    match setup_context() {
        Ok(ctx) => Some(ctx),
        Err(reason) => handle_cluster_setup_failure(reason),
    }
}

fn schedule_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).expect("valid date")
}

fn notification(id: &str, session_id: Uuid, event_ids: &[&str]) -> UserNotification {
    UserNotification {
        notification_id: id.to_owned(),
        user_id: UserId::new(USER),
        schedule_date: schedule_day(),
        source_session_id: session_id,
        notification_type: NotificationType::Event,
        message: "2026-03-02: Acme added 10:00-14:00".to_owned(),
        event_ids: event_ids.iter().map(|id| (*id).to_owned()).collect(),
    }
}

fn stored_statuses(url: &str) -> Vec<(String, Option<chrono::DateTime<Utc>>)> {
    let mut client = Client::connect(url, NoTls).expect("connect for readback");
    client
        .query(
            "SELECT status, sent_at FROM schedule_ingest.schedule_notification \
             WHERE user_id = $1 ORDER BY notification_id",
            &[&USER],
        )
        .map_err(|err| format_postgres_error(&err))
        .expect("notification rows load")
        .iter()
        .map(|row| (row.get("status"), row.get("sent_at")))
        .collect()
}

#[rstest]
fn inserts_are_conflict_ignored_and_notified_ids_accumulate(repo_context: Option<TestContext>) {
    let Some(context) = repo_context else {
        eprintln!("SKIP-TEST-CLUSTER: inserts_are_conflict_ignored skipped");
        return;
    };

    let repository = context.repository.clone();
    let session_id = Uuid::new_v4();
    let batch = vec![
        notification("notif-a", session_id, &["event-1"]),
        notification("notif-b", session_id, &["event-2", "event-3"]),
    ];

    let inserted = context
        .runtime
        .block_on(async { repository.store_notifications(&batch, Utc::now()).await })
        .expect("store succeeds");
    assert_eq!(inserted, 2);

    // Replaying the same deterministic ids writes nothing new.
    let replay = context
        .runtime
        .block_on(async { repository.store_notifications(&batch, Utc::now()).await })
        .expect("replay succeeds");
    assert_eq!(replay, 0);

    let notified = context
        .runtime
        .block_on(async {
            repository
                .already_notified_event_ids(UserId::new(USER), schedule_day())
                .await
        })
        .expect("notified ids load");
    let expected: HashSet<String> = ["event-1", "event-2", "event-3"]
        .iter()
        .map(|id| (*id).to_owned())
        .collect();
    assert_eq!(notified, expected);

    // Rows are born pending; delivery columns stay untouched by this worker.
    let statuses = stored_statuses(&context.database_url);
    assert_eq!(statuses.len(), 2);
    for (status, sent_at) in statuses {
        assert_eq!(status, "pending");
        assert!(sent_at.is_none());
    }
}

#[rstest]
fn other_days_do_not_leak_into_the_notified_set(repo_context: Option<TestContext>) {
    let Some(context) = repo_context else {
        eprintln!("SKIP-TEST-CLUSTER: other_days_do_not_leak_into_the_notified_set skipped");
        return;
    };

    let repository = context.repository.clone();
    let session_id = Uuid::new_v4();
    let mut other_day = notification("notif-other", session_id, &["event-9"]);
    other_day.schedule_date = NaiveDate::from_ymd_opt(2026, 3, 3).expect("valid date");

    context
        .runtime
        .block_on(async {
            repository
                .store_notifications(
                    &[notification("notif-a", session_id, &["event-1"]), other_day],
                    Utc::now(),
                )
                .await
        })
        .expect("store succeeds");

    let notified = context
        .runtime
        .block_on(async {
            repository
                .already_notified_event_ids(UserId::new(USER), schedule_day())
                .await
        })
        .expect("notified ids load");
    assert_eq!(notified.len(), 1);
    assert!(notified.contains("event-1"));
}
