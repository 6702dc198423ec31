//! Multi-screenshot aggregation of one day's shift observations.
//!
//! Every screenshot of a session yields its own canonical shift list; this
//! module merges them into a single day. Candidates sharing a location
//! fingerprint merge when their circular time distance is within tolerance
//! or one range contains the other, transitively across the whole group.

use std::collections::BTreeMap;

use thiserror::Error;

use super::shift::{AggregatedShift, CanonicalShift, ShiftType};
use super::time_of_day::{circular_centroid, TimeOfDay};

/// Tunables for the merge relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationConfig {
    /// Maximum circular drift (minutes) each endpoint may show between two
    /// observations of the same shift.
    pub time_tolerance_minutes: u16,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            time_tolerance_minutes: 5,
        }
    }
}

/// Raised when merge invariants are violated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    /// A merge component spanned more than one location fingerprint.
    #[error("merge component mixed location identities: {left} vs {right}")]
    MixedIdentity { left: String, right: String },
}

#[derive(Debug, Clone)]
struct ShiftRef {
    image_index: usize,
    position: usize,
    shift: CanonicalShift,
}

/// Merge per-screenshot canonical shift lists into one aggregated day.
///
/// Deterministic: output depends only on the input sets and the tolerance,
/// never on incidental iteration order.
pub fn aggregate_session_shifts(
    session_images: &[Vec<CanonicalShift>],
    config: AggregationConfig,
) -> Result<Vec<AggregatedShift>, AggregationError> {
    let mut refs: Vec<ShiftRef> = Vec::new();
    for (image_index, image_shifts) in session_images.iter().enumerate() {
        for (position, shift) in image_shifts.iter().enumerate() {
            refs.push(ShiftRef {
                image_index,
                position,
                shift: shift.clone(),
            });
        }
    }

    let mut grouped: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (index, reference) in refs.iter().enumerate() {
        grouped
            .entry(reference.shift.location_fingerprint.as_str())
            .or_default()
            .push(index);
    }

    let mut merged = Vec::new();
    for indices in grouped.values() {
        merged.extend(merge_location_group(&refs, indices, config)?);
    }

    merged.sort_by(|a, b| {
        a.shift
            .canonical_sort_key()
            .cmp(&b.shift.canonical_sort_key())
    });
    Ok(merged)
}

fn merge_location_group(
    refs: &[ShiftRef],
    indices: &[usize],
    config: AggregationConfig,
) -> Result<Vec<AggregatedShift>, AggregationError> {
    let mut union = UnionFind::new(indices.len());
    for (a_pos, &a_index) in indices.iter().enumerate() {
        for (b_pos, &b_index) in indices.iter().enumerate().skip(a_pos + 1) {
            if merge_eligible(&refs[a_index].shift, &refs[b_index].shift, config) {
                union.join(a_pos, b_pos);
            }
        }
    }

    let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (pos, &index) in indices.iter().enumerate() {
        components.entry(union.root(pos)).or_default().push(index);
    }

    components
        .into_values()
        .map(|component| merge_component(refs, component))
        .collect()
}

fn merge_eligible(left: &CanonicalShift, right: &CanonicalShift, config: AggregationConfig) -> bool {
    let tolerance = config.time_tolerance_minutes;
    if left.start.circular_distance(right.start) <= tolerance
        && left.end.circular_distance(right.end) <= tolerance
    {
        return true;
    }
    range_contains(left, right) || range_contains(right, left)
}

/// True when walking clockwise from `outer.start`, `inner` stays inside
/// `outer`'s span.
fn range_contains(outer: &CanonicalShift, inner: &CanonicalShift) -> bool {
    let outer_span = u32::from(outer.start.clockwise_span(outer.end));
    let inner_span = u32::from(inner.start.clockwise_span(inner.end));
    let offset = u32::from(outer.start.clockwise_span(inner.start));
    offset + inner_span <= outer_span
}

fn merge_component(
    refs: &[ShiftRef],
    mut component: Vec<usize>,
) -> Result<AggregatedShift, AggregationError> {
    component.sort_by_key(|&index| (refs[index].image_index, refs[index].position));
    let members: Vec<&ShiftRef> = component.iter().map(|&index| &refs[index]).collect();
    let first = members.first().expect("components are never empty");

    for member in &members {
        if member.shift.location_fingerprint != first.shift.location_fingerprint {
            return Err(AggregationError::MixedIdentity {
                left: first.shift.location_fingerprint.clone(),
                right: member.shift.location_fingerprint.clone(),
            });
        }
    }

    let starts: Vec<TimeOfDay> = members.iter().map(|m| m.shift.start).collect();
    let ends: Vec<TimeOfDay> = members.iter().map(|m| m.shift.end).collect();
    let start = earliest_circular(&starts);
    let end = latest_circular(&ends);

    let pick = |field: fn(&CanonicalShift) -> &str| -> String {
        let mut best = "";
        for member in &members {
            let value = field(&member.shift);
            if value.chars().count() > best.chars().count() {
                best = value;
            }
        }
        best.to_owned()
    };

    let customer_fingerprint = members
        .iter()
        .map(|m| m.shift.customer_fingerprint.as_str())
        .min()
        .expect("components are never empty")
        .to_owned();

    Ok(AggregatedShift {
        shift: CanonicalShift {
            start,
            end,
            customer_name: pick(|s| s.customer_name.as_str()),
            street: pick(|s| s.street.as_str()),
            street_number: pick(|s| s.street_number.as_str()),
            postal_code: pick(|s| s.postal_code.as_str()),
            postal_area: pick(|s| s.postal_area.as_str()),
            city: pick(|s| s.city.as_str()),
            shift_type: majority_shift_type(&members),
            location_fingerprint: first.shift.location_fingerprint.clone(),
            customer_fingerprint,
        },
        source_count: members.len(),
    })
}

fn majority_shift_type(members: &[&ShiftRef]) -> ShiftType {
    let mut counts: BTreeMap<ShiftType, usize> = BTreeMap::new();
    for member in members {
        *counts.entry(member.shift.shift_type).or_default() += 1;
    }
    let best_count = counts.values().copied().max().unwrap_or_default();
    counts
        .into_iter()
        .filter(|(_, count)| *count == best_count)
        .map(|(shift_type, _)| shift_type)
        .min()
        .unwrap_or(ShiftType::Unknown)
}

/// The start that lies furthest counterclockwise of the circular centroid.
fn earliest_circular(times: &[TimeOfDay]) -> TimeOfDay {
    let centroid = circular_centroid(times).expect("components are never empty");
    *times
        .iter()
        .min_by_key(|time| (time.signed_offset_from(centroid), time.minutes()))
        .expect("components are never empty")
}

/// The end that lies furthest clockwise of the circular centroid.
fn latest_circular(times: &[TimeOfDay]) -> TimeOfDay {
    let centroid = circular_centroid(times).expect("components are never empty");
    *times
        .iter()
        .max_by_key(|time| (time.signed_offset_from(centroid), time.minutes()))
        .expect("components are never empty")
}

struct UnionFind {
    parents: Vec<usize>,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        Self {
            parents: (0..size).collect(),
        }
    }

    fn root(&mut self, index: usize) -> usize {
        let mut current = index;
        while self.parents[current] != current {
            self.parents[current] = self.parents[self.parents[current]];
            current = self.parents[current];
        }
        current
    }

    fn join(&mut self, left: usize, right: usize) {
        let left_root = self.root(left);
        let right_root = self.root(right);
        if left_root != right_root {
            // Attach the larger root under the smaller to keep roots stable.
            let (low, high) = if left_root < right_root {
                (left_root, right_root)
            } else {
                (right_root, left_root)
            };
            self.parents[high] = low;
        }
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.

    use rstest::rstest;

    use super::*;
    use crate::domain::time_of_day::TimeOfDay;

    fn shift(start: &str, end: &str, location: &str, customer: &str) -> CanonicalShift {
        CanonicalShift {
            start: TimeOfDay::parse(start).expect("valid time"),
            end: TimeOfDay::parse(end).expect("valid time"),
            customer_name: customer.to_owned(),
            street: String::new(),
            street_number: String::new(),
            postal_code: String::new(),
            postal_area: String::new(),
            city: String::new(),
            shift_type: ShiftType::HomeVisit,
            location_fingerprint: location.to_owned(),
            customer_fingerprint: format!("fp-{customer}"),
        }
    }

    #[rstest]
    fn near_duplicate_observations_merge_into_one() {
        let images = vec![
            vec![shift("10:00", "14:00", "loc", "Acme")],
            vec![shift("10:02", "14:05", "loc", "Acme")],
        ];
        let merged =
            aggregate_session_shifts(&images, AggregationConfig::default()).expect("merges");
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source_count, 2);
        assert_eq!(merged[0].shift.start.to_string(), "10:00");
        assert_eq!(merged[0].shift.end.to_string(), "14:05");
    }

    #[rstest]
    fn containment_merges_even_outside_tolerance() {
        let images = vec![
            vec![shift("10:00", "16:00", "loc", "Acme")],
            vec![shift("11:00", "12:00", "loc", "Acme")],
        ];
        let merged =
            aggregate_session_shifts(&images, AggregationConfig::default()).expect("merges");
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].shift.start.to_string(), "10:00");
        assert_eq!(merged[0].shift.end.to_string(), "16:00");
    }

    #[rstest]
    fn distinct_times_at_same_location_stay_separate() {
        let images = vec![vec![
            shift("08:00", "09:00", "loc", "Acme"),
            shift("13:00", "14:00", "loc", "Acme"),
        ]];
        let merged =
            aggregate_session_shifts(&images, AggregationConfig::default()).expect("merges");
        assert_eq!(merged.len(), 2);
    }

    #[rstest]
    fn merges_are_transitive_within_a_group() {
        // a~b and b~c are within tolerance while a~c alone is not; all three
        // must still land in one component.
        let images = vec![vec![
            shift("10:00", "14:00", "loc", "Acme"),
            shift("10:04", "14:00", "loc", "Acme"),
            shift("10:08", "14:00", "loc", "Acme"),
        ]];
        let merged =
            aggregate_session_shifts(&images, AggregationConfig::default()).expect("merges");
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source_count, 3);
    }

    #[rstest]
    fn cross_midnight_cluster_picks_circular_bounds() {
        let images = vec![
            vec![shift("23:50", "06:00", "loc", "Acme")],
            vec![shift("00:02", "06:03", "loc", "Acme")],
        ];
        let merged =
            aggregate_session_shifts(&images, AggregationConfig::default()).expect("merges");
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].shift.start.to_string(), "23:50");
        assert_eq!(merged[0].shift.end.to_string(), "06:03");
    }

    #[rstest]
    fn longest_non_empty_field_wins_with_positional_tie_break() {
        let mut sparse = shift("10:00", "14:00", "loc", "Acme");
        sparse.street = "Storg".to_owned();
        let mut rich = shift("10:01", "14:01", "loc", "Acme");
        rich.street = "Storgatan".to_owned();
        let images = vec![vec![sparse], vec![rich]];
        let merged =
            aggregate_session_shifts(&images, AggregationConfig::default()).expect("merges");
        assert_eq!(merged[0].shift.street, "Storgatan");
    }

    #[rstest]
    fn shift_type_majority_breaks_ties_by_enum_order() {
        let mut office = shift("10:00", "14:00", "loc", "Acme");
        office.shift_type = ShiftType::Office;
        let mut school = shift("10:01", "14:01", "loc", "Acme");
        school.shift_type = ShiftType::School;
        let images = vec![vec![office], vec![school]];
        let merged =
            aggregate_session_shifts(&images, AggregationConfig::default()).expect("merges");
        assert_eq!(merged[0].shift.shift_type, ShiftType::School);
    }

    #[rstest]
    fn customer_fingerprint_takes_lexicographic_minimum() {
        let a = shift("10:00", "14:00", "loc", "Beta");
        let b = shift("10:01", "14:01", "loc", "Alpha");
        let images = vec![vec![a], vec![b]];
        let merged =
            aggregate_session_shifts(&images, AggregationConfig::default()).expect("merges");
        assert_eq!(merged[0].shift.customer_fingerprint, "fp-Alpha");
    }

    #[rstest]
    fn aggregation_is_idempotent() {
        let images = vec![
            vec![
                shift("10:00", "14:00", "loc-a", "Acme"),
                shift("08:00", "09:00", "loc-b", "Beta"),
            ],
            vec![shift("10:03", "14:02", "loc-a", "Acme")],
        ];
        let once =
            aggregate_session_shifts(&images, AggregationConfig::default()).expect("merges");
        let shifts: Vec<CanonicalShift> = once.iter().map(|a| a.shift.clone()).collect();
        let twice = aggregate_session_shifts(&[shifts], AggregationConfig::default())
            .expect("merges");
        let left: Vec<&CanonicalShift> = once.iter().map(|a| &a.shift).collect();
        let right: Vec<&CanonicalShift> = twice.iter().map(|a| &a.shift).collect();
        assert_eq!(left, right);
    }

    #[rstest]
    fn single_image_round_trips_up_to_order() {
        let input = vec![
            shift("13:00", "14:00", "loc-b", "Beta"),
            shift("08:00", "09:00", "loc-a", "Acme"),
        ];
        let merged = aggregate_session_shifts(&[input.clone()], AggregationConfig::default())
            .expect("merges");
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().all(|a| a.source_count == 1));
        for aggregated in &merged {
            assert!(input.contains(&aggregated.shift));
        }
    }
}
