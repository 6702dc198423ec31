//! Deterministic notification generation from persisted schedule events.
//!
//! Messages are built from canonical fields only, never raw OCR text. Many
//! simultaneous changes collapse into a single summary so a reshuffled day
//! does not storm the user's inbox.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use uuid::Uuid;

use super::events::{ScheduleEventType, StoredScheduleEvent};
use super::hashing::sha256_hex;
use super::session::UserId;
use super::shift::CanonicalShift;

/// Outbound message classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationType {
    Event,
    Summary,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Summary => "summary",
        }
    }
}

/// A user-facing notification ready for the outbound store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserNotification {
    /// Deterministic primary key; replays produce the same id.
    pub notification_id: String,
    pub user_id: UserId,
    pub schedule_date: NaiveDate,
    pub source_session_id: Uuid,
    pub notification_type: NotificationType,
    pub message: String,
    pub event_ids: Vec<String>,
}

/// Build notifications for one processed session.
///
/// Events already covered by a stored notification are dropped; if the
/// remainder reaches `summary_threshold`, one summary replaces the
/// individual messages.
pub fn build_notifications(
    events: &[StoredScheduleEvent],
    summary_threshold: usize,
    already_notified: &HashSet<String>,
) -> Vec<UserNotification> {
    let threshold = summary_threshold.max(1);

    let mut seen: HashSet<String> = already_notified.clone();
    let mut fresh: Vec<&StoredScheduleEvent> = Vec::new();
    for event in events {
        let id = event.event_id.to_string();
        if seen.contains(&id) {
            continue;
        }
        seen.insert(id);
        fresh.push(event);
    }
    if fresh.is_empty() {
        return Vec::new();
    }
    fresh.sort_by_key(|event| event_sort_key(event));

    let first = fresh[0];
    let date_text = first.schedule_date.format("%Y-%m-%d").to_string();

    if fresh.len() >= threshold {
        let event_ids: Vec<String> = fresh.iter().map(|e| e.event_id.to_string()).collect();
        let message = summary_message(&date_text, &fresh);
        return vec![UserNotification {
            notification_id: notification_id(first, NotificationType::Summary, &event_ids),
            user_id: first.user_id,
            schedule_date: first.schedule_date,
            source_session_id: first.source_session_id,
            notification_type: NotificationType::Summary,
            message,
            event_ids,
        }];
    }

    fresh
        .into_iter()
        .map(|event| {
            let event_ids = vec![event.event_id.to_string()];
            UserNotification {
                notification_id: notification_id(event, NotificationType::Event, &event_ids),
                user_id: event.user_id,
                schedule_date: event.schedule_date,
                source_session_id: event.source_session_id,
                notification_type: NotificationType::Event,
                message: event_message(&date_text, event),
                event_ids,
            }
        })
        .collect()
}

fn event_sort_key(event: &StoredScheduleEvent) -> (ScheduleEventType, String, String, String) {
    let anchor = event.anchor();
    (
        event.event_type,
        anchor
            .map(|s| s.location_fingerprint.clone())
            .unwrap_or_default(),
        anchor.map(|s| s.start.to_string()).unwrap_or_default(),
        event.event_id.to_string(),
    )
}

fn event_message(date: &str, event: &StoredScheduleEvent) -> String {
    let old = event.old_value.as_ref();
    let new = event.new_value.as_ref();
    let customer = display_customer(event.anchor());

    match event.event_type {
        ScheduleEventType::Added => match new {
            Some(shift) => format!("{date}: {customer} added {}-{}", shift.start, shift.end),
            None => format!("{date}: {customer} added"),
        },
        ScheduleEventType::Removed => match old {
            Some(shift) => format!("{date}: {customer} removed {}-{}", shift.start, shift.end),
            None => format!("{date}: {customer} removed"),
        },
        ScheduleEventType::TimeChanged => time_change_message(date, &customer, old, new),
        ScheduleEventType::Relocated => {
            let address = new.map(display_address).unwrap_or_default();
            if address.is_empty() {
                format!("{date}: {customer} moved to a new address")
            } else {
                format!("{date}: {customer} moved to {address}")
            }
        }
        ScheduleEventType::Retitled => {
            let before = display_customer(old);
            let after = display_customer(new);
            format!("{date}: {before} renamed to {after}")
        }
        ScheduleEventType::Reclassified => {
            let label = new.map(|s| s.shift_type.label()).unwrap_or("unclassified shift");
            format!("{date}: {customer} reclassified as {label}")
        }
    }
}

fn time_change_message(
    date: &str,
    customer: &str,
    old: Option<&CanonicalShift>,
    new: Option<&CanonicalShift>,
) -> String {
    let (Some(old), Some(new)) = (old, new) else {
        return format!("{date}: {customer} schedule updated");
    };
    let start_changed = old.start != new.start;
    let end_changed = old.end != new.end;
    if start_changed && !end_changed {
        format!("{date}: {customer} moved {} → {}", old.start, new.start)
    } else if end_changed && !start_changed {
        format!("{date}: {customer} ends {} → {}", old.end, new.end)
    } else {
        format!(
            "{date}: {customer} {}-{} → {}-{}",
            old.start, old.end, new.start, new.end
        )
    }
}

fn summary_message(date: &str, events: &[&StoredScheduleEvent]) -> String {
    let mut counts: BTreeMap<ScheduleEventType, usize> = BTreeMap::new();
    for event in events {
        *counts.entry(event.event_type).or_default() += 1;
    }
    let breakdown = ScheduleEventType::all()
        .into_iter()
        .filter_map(|event_type| {
            counts.get(&event_type).map(|count| {
                format!("{count} {}", summary_label(event_type))
            })
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("{date}: {} schedule changes ({breakdown})", events.len())
}

fn summary_label(event_type: ScheduleEventType) -> &'static str {
    match event_type {
        ScheduleEventType::Added => "added",
        ScheduleEventType::Removed => "removed",
        ScheduleEventType::TimeChanged => "time changed",
        ScheduleEventType::Relocated => "relocated",
        ScheduleEventType::Retitled => "retitled",
        ScheduleEventType::Reclassified => "reclassified",
    }
}

fn display_customer(shift: Option<&CanonicalShift>) -> String {
    match shift {
        Some(shift) if !shift.customer_name.is_empty() => shift.customer_name.clone(),
        Some(shift) if !shift.city.is_empty() => shift.city.clone(),
        _ => "Shift".to_owned(),
    }
}

fn display_address(shift: &CanonicalShift) -> String {
    [&shift.street, &shift.street_number, &shift.city]
        .iter()
        .filter(|part| !part.is_empty())
        .map(|part| part.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// SHA-256 of `user_id|schedule_date|source_session_id|type|sorted_event_ids`.
fn notification_id(
    event: &StoredScheduleEvent,
    notification_type: NotificationType,
    event_ids: &[String],
) -> String {
    let mut sorted = event_ids.to_vec();
    sorted.sort_unstable();
    let payload = format!(
        "{}|{}|{}|{}|{}",
        event.user_id,
        event.schedule_date.format("%Y-%m-%d"),
        event.source_session_id,
        notification_type.as_str(),
        sorted.join("|"),
    );
    sha256_hex(payload.as_bytes())
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.

    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    use super::*;
    use crate::domain::shift::ShiftType;
    use crate::domain::time_of_day::TimeOfDay;

    fn shift(start: &str, end: &str) -> CanonicalShift {
        CanonicalShift {
            start: TimeOfDay::parse(start).expect("valid time"),
            end: TimeOfDay::parse(end).expect("valid time"),
            customer_name: "Acme".to_owned(),
            street: "Storgatan".to_owned(),
            street_number: "5".to_owned(),
            postal_code: String::new(),
            postal_area: String::new(),
            city: "Goteborg".to_owned(),
            shift_type: ShiftType::HomeVisit,
            location_fingerprint: "loc".to_owned(),
            customer_fingerprint: "cust".to_owned(),
        }
    }

    fn event(
        id: u128,
        event_type: ScheduleEventType,
        old: Option<CanonicalShift>,
        new: Option<CanonicalShift>,
    ) -> StoredScheduleEvent {
        StoredScheduleEvent {
            event_id: Uuid::from_u128(id),
            user_id: UserId::new(7),
            schedule_date: NaiveDate::from_ymd_opt(2026, 3, 2).expect("valid date"),
            event_type,
            location_fingerprint: "loc".to_owned(),
            customer_fingerprint: "cust".to_owned(),
            old_value: old,
            new_value: new,
            detected_at: Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).single().expect("valid"),
            source_session_id: Uuid::from_u128(999),
        }
    }

    #[rstest]
    fn single_added_event_yields_one_event_notification() {
        let events = vec![event(1, ScheduleEventType::Added, None, Some(shift("10:00", "14:00")))];
        let notifications = build_notifications(&events, 3, &HashSet::new());
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].notification_type, NotificationType::Event);
        assert_eq!(notifications[0].message, "2026-03-02: Acme added 10:00-14:00");
    }

    #[rstest]
    fn both_endpoints_moving_renders_full_range() {
        let events = vec![event(
            1,
            ScheduleEventType::TimeChanged,
            Some(shift("10:00", "14:00")),
            Some(shift("10:30", "14:30")),
        )];
        let notifications = build_notifications(&events, 3, &HashSet::new());
        assert_eq!(
            notifications[0].message,
            "2026-03-02: Acme 10:00-14:00 → 10:30-14:30"
        );
    }

    #[rstest]
    fn start_only_move_uses_the_short_template() {
        let events = vec![event(
            1,
            ScheduleEventType::TimeChanged,
            Some(shift("10:00", "14:00")),
            Some(shift("10:30", "14:00")),
        )];
        let notifications = build_notifications(&events, 3, &HashSet::new());
        assert_eq!(notifications[0].message, "2026-03-02: Acme moved 10:00 → 10:30");
    }

    #[rstest]
    fn end_only_move_uses_the_ends_template() {
        let events = vec![event(
            1,
            ScheduleEventType::TimeChanged,
            Some(shift("10:00", "14:00")),
            Some(shift("10:00", "15:00")),
        )];
        let notifications = build_notifications(&events, 3, &HashSet::new());
        assert_eq!(notifications[0].message, "2026-03-02: Acme ends 14:00 → 15:00");
    }

    #[rstest]
    fn threshold_collapses_events_into_one_summary() {
        let events: Vec<StoredScheduleEvent> = (1..=5)
            .map(|id| {
                let mut added = shift("10:00", "14:00");
                added.location_fingerprint = format!("loc-{id}");
                event(id as u128, ScheduleEventType::Added, None, Some(added))
            })
            .collect();
        let notifications = build_notifications(&events, 3, &HashSet::new());
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].notification_type, NotificationType::Summary);
        assert_eq!(notifications[0].event_ids.len(), 5);
        assert_eq!(
            notifications[0].message,
            "2026-03-02: 5 schedule changes (5 added)"
        );
    }

    #[rstest]
    fn already_notified_events_are_dropped() {
        let added = event(1, ScheduleEventType::Added, None, Some(shift("10:00", "14:00")));
        let mut notified = HashSet::new();
        notified.insert(added.event_id.to_string());
        assert!(build_notifications(&[added], 3, &notified).is_empty());
    }

    #[rstest]
    fn notification_id_is_deterministic_and_order_independent() {
        let a = event(1, ScheduleEventType::Added, None, Some(shift("10:00", "14:00")));
        let mut b = event(2, ScheduleEventType::Added, None, Some(shift("08:00", "09:00")));
        b.location_fingerprint = "loc-b".to_owned();
        let mut b_shift = shift("08:00", "09:00");
        b_shift.location_fingerprint = "loc-b".to_owned();
        b.new_value = Some(b_shift);

        let forward = build_notifications(&[a.clone(), b.clone()], 2, &HashSet::new());
        let reversed = build_notifications(&[b, a], 2, &HashSet::new());
        assert_eq!(forward.len(), 1);
        assert_eq!(
            forward[0].notification_id,
            reversed[0].notification_id
        );
    }

    #[rstest]
    fn duplicate_event_ids_within_a_batch_are_deduped() {
        let added = event(1, ScheduleEventType::Added, None, Some(shift("10:00", "14:00")));
        let notifications =
            build_notifications(&[added.clone(), added], 3, &HashSet::new());
        assert_eq!(notifications.len(), 1);
    }
}
