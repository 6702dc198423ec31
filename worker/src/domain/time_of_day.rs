//! Minute-of-day values with circular 24-hour arithmetic.
//!
//! Schedule shifts may straddle midnight, so every distance and ordering
//! computation works modulo 24 hours. Naive integer min/max over minutes is
//! incorrect for clusters like 23:50/00:10 and must not be reintroduced.

use std::fmt;

use thiserror::Error;

/// Number of minutes on the circular clock.
pub const MINUTES_PER_DAY: i32 = 24 * 60;

/// Half a day in minutes; the maximum circular distance between two times.
pub const HALF_DAY_MINUTES: i32 = MINUTES_PER_DAY / 2;

/// A wall-clock time of day held as minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

/// Raised when a time string is not `HH:MM` or `HH.MM` within 24-hour range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid time value: {value}")]
pub struct TimeParseError {
    /// The rejected input, for error messages only.
    pub value: String,
}

impl TimeOfDay {
    /// Build a time from hour and minute components.
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(Self((hour * 60 + minute) as u16))
    }

    /// Parse `HH:MM` or `HH.MM` (one or two hour digits, exactly two minute
    /// digits). Any other shape is rejected.
    pub fn parse(value: &str) -> Result<Self, TimeParseError> {
        let reject = || TimeParseError {
            value: value.to_owned(),
        };
        let trimmed = value.trim();
        let (hour_text, minute_text) = trimmed
            .split_once([':', '.'])
            .ok_or_else(reject)?;
        if hour_text.is_empty()
            || hour_text.len() > 2
            || minute_text.len() != 2
            || !hour_text.bytes().all(|b| b.is_ascii_digit())
            || !minute_text.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(reject());
        }
        let hour: u32 = hour_text.parse().map_err(|_| reject())?;
        let minute: u32 = minute_text.parse().map_err(|_| reject())?;
        Self::new(hour, minute).ok_or_else(reject)
    }

    /// Minutes since midnight.
    pub fn minutes(self) -> u16 {
        self.0
    }

    /// Circular distance to `other`, always in `0..=720`.
    pub fn circular_distance(self, other: Self) -> u16 {
        let raw = (i32::from(self.0) - i32::from(other.0)).abs();
        raw.min(MINUTES_PER_DAY - raw) as u16
    }

    /// Minutes walked clockwise from `self` to reach `until`.
    pub fn clockwise_span(self, until: Self) -> u16 {
        (i32::from(until.0) - i32::from(self.0)).rem_euclid(MINUTES_PER_DAY) as u16
    }

    /// Signed offset from `reference` in `(-720, 720]`.
    ///
    /// Negative offsets lie counterclockwise (earlier) of the reference.
    pub fn signed_offset_from(self, reference: Self) -> i32 {
        let forward = (i32::from(self.0) - i32::from(reference.0)).rem_euclid(MINUTES_PER_DAY);
        if forward > HALF_DAY_MINUTES {
            forward - MINUTES_PER_DAY
        } else {
            forward
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

/// Circular mean of the given times.
///
/// Falls back to the first element when the points cancel out (e.g. two
/// antipodal times), which keeps the result deterministic.
pub fn circular_centroid(times: &[TimeOfDay]) -> Option<TimeOfDay> {
    let first = *times.first()?;
    let tau = std::f64::consts::TAU;
    let (mut sin_sum, mut cos_sum) = (0.0_f64, 0.0_f64);
    for time in times {
        let angle = tau * f64::from(time.minutes()) / f64::from(MINUTES_PER_DAY as u32);
        sin_sum += angle.sin();
        cos_sum += angle.cos();
    }
    if sin_sum.abs() < 1e-9 && cos_sum.abs() < 1e-9 {
        return Some(first);
    }
    let mean_angle = sin_sum.atan2(cos_sum).rem_euclid(tau);
    let minutes = (mean_angle / tau * f64::from(MINUTES_PER_DAY as u32)).round() as i32;
    let minutes = minutes.rem_euclid(MINUTES_PER_DAY) as u16;
    Some(TimeOfDay(minutes.min((MINUTES_PER_DAY - 1) as u16)))
}
