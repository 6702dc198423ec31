//! Schedule-date detection from screenshot header text.
//!
//! The day a schedule belongs to is read from the app's own date header
//! (`"Monday 3 March 2026"`, `"måndag 3 mars"`), never inferred from file
//! names or capture timestamps. Swedish and English month and weekday names
//! are both recognised; a missing year falls back to the configured default.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use super::identity::{collapse_whitespace, strip_accents};
use super::layout::TextBox;

static DATE_WITH_WEEKDAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Za-zÅÄÖåäö]+)\s+(\d{1,2})\s+([A-Za-zÅÄÖåäö]+)(?:\s+(\d{4}))?\b")
        .expect("weekday date pattern compiles")
});
static DATE_DAY_MONTH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})\s+([A-Za-zÅÄÖåäö]+)(?:\s+(\d{4}))?\b")
        .expect("day month pattern compiles")
});

const WEEKDAY_NAMES: &[&str] = &[
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday", "mandag",
    "tisdag", "onsdag", "torsdag", "fredag", "lordag", "sondag",
];

const MONTHS: &[(&str, u32)] = &[
    ("jan", 1),
    ("january", 1),
    ("januari", 1),
    ("feb", 2),
    ("february", 2),
    ("februari", 2),
    ("mar", 3),
    ("march", 3),
    ("mars", 3),
    ("apr", 4),
    ("april", 4),
    ("may", 5),
    ("maj", 5),
    ("jun", 6),
    ("june", 6),
    ("juni", 6),
    ("jul", 7),
    ("july", 7),
    ("juli", 7),
    ("aug", 8),
    ("august", 8),
    ("augusti", 8),
    ("sep", 9),
    ("sept", 9),
    ("september", 9),
    ("oct", 10),
    ("october", 10),
    ("okt", 10),
    ("oktober", 10),
    ("nov", 11),
    ("november", 11),
    ("dec", 12),
    ("december", 12),
];

/// Failures while resolving the schedule date of a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleDateError {
    /// No box or line carried a recognisable date.
    #[error("could not resolve a schedule date from the screenshot text")]
    NotFound,
    /// A year-less date was found but no default year is configured.
    #[error("date header is missing a year and no default year is configured")]
    MissingYear,
    /// A session's screenshots disagree on the day they show.
    #[error("inconsistent schedule dates across session images: {0}")]
    Inconsistent(String),
    /// The session produced no dates at all.
    #[error("no schedule date detected for the session")]
    Empty,
}

/// Detect the schedule date shown in one screenshot.
pub fn detect_schedule_date(
    boxes: &[TextBox],
    default_year: Option<i32>,
) -> Result<NaiveDate, ScheduleDateError> {
    let mut missing_year = false;
    for candidate in date_candidate_texts(boxes) {
        match parse_date_from_text(&candidate, default_year) {
            Ok(Some(date)) => return Ok(date),
            Ok(None) => {}
            Err(ScheduleDateError::MissingYear) => missing_year = true,
            Err(other) => return Err(other),
        }
    }
    if missing_year {
        Err(ScheduleDateError::MissingYear)
    } else {
        Err(ScheduleDateError::NotFound)
    }
}

/// Require all images of a session to agree on one date.
pub fn resolve_session_date(dates: &[NaiveDate]) -> Result<NaiveDate, ScheduleDateError> {
    let mut unique: Vec<NaiveDate> = dates.to_vec();
    unique.sort_unstable();
    unique.dedup();
    match unique.as_slice() {
        [] => Err(ScheduleDateError::Empty),
        [single] => Ok(*single),
        many => Err(ScheduleDateError::Inconsistent(
            many.iter()
                .map(|d| d.format("%Y-%m-%d").to_string())
                .collect::<Vec<_>>()
                .join(", "),
        )),
    }
}

/// Reconstruct line texts first so a date split across OCR tokens still
/// parses, then fall back to individual boxes.
fn date_candidate_texts(boxes: &[TextBox]) -> Vec<String> {
    let mut cleaned: Vec<(String, f64, f64, f64)> = boxes
        .iter()
        .filter_map(|b| {
            let text = collapse_whitespace(&b.text);
            if text.is_empty() {
                None
            } else {
                Some((text, b.x, b.y, b.h.max(1.0)))
            }
        })
        .collect();
    if cleaned.is_empty() {
        return Vec::new();
    }
    cleaned.sort_by(|a, b| {
        (a.2, a.1)
            .partial_cmp(&(b.2, b.1))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut heights: Vec<f64> = cleaned.iter().map(|c| c.3).collect();
    heights.sort_by(f64::total_cmp);
    let median_height = heights[heights.len() / 2];
    let threshold = (median_height * 0.6).max(8.0);

    let mut lines: Vec<String> = Vec::new();
    let mut current: Vec<&(String, f64, f64, f64)> = Vec::new();
    let mut current_center = 0.0;
    for item in &cleaned {
        let center = item.2 + item.3 / 2.0;
        if current.is_empty() {
            current.push(item);
            current_center = center;
            continue;
        }
        if (center - current_center).abs() <= threshold {
            current.push(item);
            let count = current.len() as f64;
            current_center = (current_center * (count - 1.0) + center) / count;
        } else {
            lines.push(join_line(&current));
            current.clear();
            current.push(item);
            current_center = center;
        }
    }
    if !current.is_empty() {
        lines.push(join_line(&current));
    }

    lines.extend(cleaned.iter().map(|c| c.0.clone()));
    lines
}

fn join_line(items: &[&(String, f64, f64, f64)]) -> String {
    let mut sorted = items.to_vec();
    sorted.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    sorted
        .iter()
        .map(|item| item.0.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_date_from_text(
    text: &str,
    default_year: Option<i32>,
) -> Result<Option<NaiveDate>, ScheduleDateError> {
    for captures in DATE_WITH_WEEKDAY_RE.captures_iter(text) {
        let weekday = fold_token(&captures[1]);
        if !WEEKDAY_NAMES.contains(&weekday.as_str()) {
            continue;
        }
        if let Some(date) = build_date(
            &captures[2],
            &captures[3],
            captures.get(4).map(|m| m.as_str()),
            default_year,
        )? {
            return Ok(Some(date));
        }
    }
    for captures in DATE_DAY_MONTH_RE.captures_iter(text) {
        if let Some(date) = build_date(
            &captures[1],
            &captures[2],
            captures.get(3).map(|m| m.as_str()),
            default_year,
        )? {
            return Ok(Some(date));
        }
    }
    Ok(None)
}

fn build_date(
    day_text: &str,
    month_text: &str,
    year_text: Option<&str>,
    default_year: Option<i32>,
) -> Result<Option<NaiveDate>, ScheduleDateError> {
    let month_key = fold_token(month_text);
    let Some(&(_, month)) = MONTHS.iter().find(|(name, _)| *name == month_key) else {
        return Ok(None);
    };
    let Ok(day) = day_text.parse::<u32>() else {
        return Ok(None);
    };
    let year = match year_text {
        Some(text) => match text.parse::<i32>() {
            Ok(year) => year,
            Err(_) => return Ok(None),
        },
        None => default_year.ok_or(ScheduleDateError::MissingYear)?,
    };
    Ok(NaiveDate::from_ymd_opt(year, month, day))
}

fn fold_token(value: &str) -> String {
    strip_accents(&collapse_whitespace(value)).to_lowercase()
}
