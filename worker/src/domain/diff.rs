//! Semantic diff between the prior day snapshot and a new observation.

use std::collections::BTreeMap;

use super::events::ScheduleEventType;
use super::shift::CanonicalShift;

/// One detected change, carrying full old/new shift values by copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleDiffEvent {
    Added(CanonicalShift),
    Removed(CanonicalShift),
    TimeChanged {
        before: CanonicalShift,
        after: CanonicalShift,
    },
    Relocated {
        before: CanonicalShift,
        after: CanonicalShift,
    },
    Retitled {
        before: CanonicalShift,
        after: CanonicalShift,
    },
    Reclassified {
        before: CanonicalShift,
        after: CanonicalShift,
    },
}

impl ScheduleDiffEvent {
    pub fn event_type(&self) -> ScheduleEventType {
        match self {
            Self::Added(_) => ScheduleEventType::Added,
            Self::Removed(_) => ScheduleEventType::Removed,
            Self::TimeChanged { .. } => ScheduleEventType::TimeChanged,
            Self::Relocated { .. } => ScheduleEventType::Relocated,
            Self::Retitled { .. } => ScheduleEventType::Retitled,
            Self::Reclassified { .. } => ScheduleEventType::Reclassified,
        }
    }

    pub fn old_value(&self) -> Option<&CanonicalShift> {
        match self {
            Self::Added(_) => None,
            Self::Removed(shift) => Some(shift),
            Self::TimeChanged { before, .. }
            | Self::Relocated { before, .. }
            | Self::Retitled { before, .. }
            | Self::Reclassified { before, .. } => Some(before),
        }
    }

    pub fn new_value(&self) -> Option<&CanonicalShift> {
        match self {
            Self::Added(shift) => Some(shift),
            Self::Removed(_) => None,
            Self::TimeChanged { after, .. }
            | Self::Relocated { after, .. }
            | Self::Retitled { after, .. }
            | Self::Reclassified { after, .. } => Some(after),
        }
    }

    /// The side carrying the event's identity: new when present, else old.
    pub fn anchor(&self) -> &CanonicalShift {
        match self {
            Self::Added(shift) | Self::Removed(shift) => shift,
            Self::TimeChanged { after, .. }
            | Self::Relocated { after, .. }
            | Self::Retitled { after, .. }
            | Self::Reclassified { after, .. } => after,
        }
    }
}

/// Diff the prior shifts against the new observation.
///
/// Shifts pair inside their `(location_fingerprint, customer_fingerprint)`
/// identity group by greedy minimum circular time distance. A pure reorder
/// of identical shifts emits nothing.
pub fn diff_day(previous: &[CanonicalShift], current: &[CanonicalShift]) -> Vec<ScheduleDiffEvent> {
    let mut groups: BTreeMap<(&str, &str), (Vec<usize>, Vec<usize>)> = BTreeMap::new();
    for (index, shift) in previous.iter().enumerate() {
        groups.entry(shift.identity_key()).or_default().0.push(index);
    }
    for (index, shift) in current.iter().enumerate() {
        groups.entry(shift.identity_key()).or_default().1.push(index);
    }

    let mut events = Vec::new();
    for (old_indices, new_indices) in groups.values() {
        let pairs = pair_by_time_distance(previous, current, old_indices, new_indices);
        for (old_index, new_index) in &pairs {
            if let Some(event) = classify_pair(&previous[*old_index], &current[*new_index]) {
                events.push(event);
            }
        }
        for &old_index in old_indices {
            if !pairs.iter().any(|(o, _)| *o == old_index) {
                events.push(ScheduleDiffEvent::Removed(previous[old_index].clone()));
            }
        }
        for &new_index in new_indices {
            if !pairs.iter().any(|(_, n)| *n == new_index) {
                events.push(ScheduleDiffEvent::Added(current[new_index].clone()));
            }
        }
    }

    events.sort_by(|a, b| event_order_key(a).cmp(&event_order_key(b)));
    events
}

/// Greedy minimum-cost assignment over the full cost matrix.
///
/// Equal costs break ties on `(old_index, new_index)` so the pairing is
/// independent of map iteration order.
fn pair_by_time_distance(
    previous: &[CanonicalShift],
    current: &[CanonicalShift],
    old_indices: &[usize],
    new_indices: &[usize],
) -> Vec<(usize, usize)> {
    let mut costs: Vec<(u32, usize, usize)> = Vec::new();
    for &old_index in old_indices {
        for &new_index in new_indices {
            let old = &previous[old_index];
            let new = &current[new_index];
            let cost = u32::from(old.start.circular_distance(new.start))
                + u32::from(old.end.circular_distance(new.end));
            costs.push((cost, old_index, new_index));
        }
    }
    costs.sort_unstable();

    let mut used_old = Vec::new();
    let mut used_new = Vec::new();
    let mut pairs = Vec::new();
    for (_, old_index, new_index) in costs {
        if used_old.contains(&old_index) || used_new.contains(&new_index) {
            continue;
        }
        used_old.push(old_index);
        used_new.push(new_index);
        pairs.push((old_index, new_index));
    }
    pairs
}

/// Classification order is fixed: time beats type beats address beats title.
fn classify_pair(before: &CanonicalShift, after: &CanonicalShift) -> Option<ScheduleDiffEvent> {
    if !before.same_times(after) {
        return Some(ScheduleDiffEvent::TimeChanged {
            before: before.clone(),
            after: after.clone(),
        });
    }
    if before.shift_type != after.shift_type {
        return Some(ScheduleDiffEvent::Reclassified {
            before: before.clone(),
            after: after.clone(),
        });
    }
    if before.address_differs(after) {
        return Some(ScheduleDiffEvent::Relocated {
            before: before.clone(),
            after: after.clone(),
        });
    }
    if before.customer_name != after.customer_name {
        return Some(ScheduleDiffEvent::Retitled {
            before: before.clone(),
            after: after.clone(),
        });
    }
    None
}

fn event_order_key(event: &ScheduleDiffEvent) -> (ScheduleEventType, String, u16, u16) {
    let anchor = event.anchor();
    (
        event.event_type(),
        anchor.location_fingerprint.clone(),
        anchor.start.minutes(),
        anchor.end.minutes(),
    )
}

/// Replay interpreter: apply a diff to the prior shifts.
///
/// `apply_events(previous, diff_day(previous, current))` equals `current` as
/// a canonical shift set; the event store's replay invariant rests on this.
pub fn apply_events(
    previous: &[CanonicalShift],
    events: &[ScheduleDiffEvent],
) -> Vec<CanonicalShift> {
    let mut shifts: Vec<CanonicalShift> = previous.to_vec();
    for event in events {
        match event {
            ScheduleDiffEvent::Added(shift) => shifts.push(shift.clone()),
            ScheduleDiffEvent::Removed(shift) => {
                if let Some(position) = shifts.iter().position(|s| s == shift) {
                    shifts.remove(position);
                }
            }
            ScheduleDiffEvent::TimeChanged { before, after }
            | ScheduleDiffEvent::Relocated { before, after }
            | ScheduleDiffEvent::Retitled { before, after }
            | ScheduleDiffEvent::Reclassified { before, after } => {
                if let Some(position) = shifts.iter().position(|s| s == before) {
                    shifts[position] = after.clone();
                }
            }
        }
    }
    shifts.sort_by(|a, b| a.canonical_sort_key().cmp(&b.canonical_sort_key()));
    shifts
}
