//! PostgreSQL-backed `NotificationRepository` implementation using Diesel.
//!
//! Inserts are conflict-ignored on the deterministic notification id, so a
//! replayed session re-derives the same ids and writes nothing new. Status
//! and delivery timestamps are owned by the downstream sender and never
//! touched here.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde_json::Value;

use crate::domain::notification_rules::UserNotification;
use crate::domain::ports::{NotificationRepository, NotificationRepositoryError};
use crate::domain::session::UserId;

use super::diesel_helpers::{map_basic_diesel_error, map_basic_pool_error};
use super::models::NewNotificationRow;
use super::pool::{DbPool, PoolError};
use super::schema::schedule_notification;

const STATUS_PENDING: &str = "pending";

/// Diesel-backed implementation of the notification repository port.
#[derive(Clone)]
pub struct DieselNotificationRepository {
    pool: DbPool,
}

impl DieselNotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> NotificationRepositoryError {
    map_basic_pool_error(error, NotificationRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> NotificationRepositoryError {
    map_basic_diesel_error(
        error,
        NotificationRepositoryError::query,
        NotificationRepositoryError::connection,
    )
}

#[async_trait]
impl NotificationRepository for DieselNotificationRepository {
    async fn already_notified_event_ids(
        &self,
        user_id: UserId,
        schedule_date: NaiveDate,
    ) -> Result<HashSet<String>, NotificationRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let payloads: Vec<Value> = schedule_notification::table
            .filter(
                schedule_notification::user_id
                    .eq(user_id.as_i64())
                    .and(schedule_notification::schedule_date.eq(schedule_date)),
            )
            .select(schedule_notification::event_ids)
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        let mut ids = HashSet::new();
        for payload in payloads {
            let Value::Array(items) = payload else {
                return Err(NotificationRepositoryError::query(
                    "notification event_ids must be a JSON array",
                ));
            };
            for item in items {
                match item {
                    Value::String(id) => {
                        ids.insert(id);
                    }
                    other => {
                        return Err(NotificationRepositoryError::query(format!(
                            "notification event id is not a string: {other}"
                        )));
                    }
                }
            }
        }
        Ok(ids)
    }

    async fn store_notifications(
        &self,
        notifications: &[UserNotification],
        created_at: DateTime<Utc>,
    ) -> Result<u64, NotificationRepositoryError> {
        if notifications.is_empty() {
            return Ok(0);
        }
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let mut inserted = 0u64;
        for notification in notifications {
            let row = NewNotificationRow {
                notification_id: notification.notification_id.clone(),
                user_id: notification.user_id.as_i64(),
                schedule_date: notification.schedule_date,
                source_session_id: notification.source_session_id,
                status: STATUS_PENDING.to_owned(),
                notification_type: notification.notification_type.as_str().to_owned(),
                message: notification.message.clone(),
                event_ids: Value::Array(
                    notification
                        .event_ids
                        .iter()
                        .map(|id| Value::String(id.clone()))
                        .collect(),
                ),
                created_at,
            };
            inserted += diesel::insert_into(schedule_notification::table)
                .values(&row)
                .on_conflict_do_nothing()
                .execute(&mut conn)
                .await
                .map_err(map_diesel_error)? as u64;
        }
        Ok(inserted)
    }
}
