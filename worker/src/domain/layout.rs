//! Deterministic layout parsing of OCR text boxes into schedule entries.
//!
//! Pure geometry: boxes are split into columns on the dominant horizontal
//! gap, clustered into lines by vertical centers, grouped into cards by
//! vertical gaps, and each card's time lines anchor its entries. Cards with
//! no time line are top-of-screen chrome and are discarded.

use once_cell::sync::Lazy;
use regex::Regex;

/// One OCR text box with its geometry and confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBox {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub confidence: f64,
}

/// A raw schedule entry as read off one card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntry {
    pub start: String,
    pub end: String,
    pub title: String,
    pub location: String,
    pub address: String,
}

#[derive(Debug, Clone)]
struct Line {
    text: String,
    x: f64,
    y: f64,
    h: f64,
}

static TIME_RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})[:.](\d{2})(?:\s*-\s*(\d{1,2})[:.](\d{2}))?\b")
        .expect("time range pattern compiles")
});

/// Parse OCR boxes into entries ordered top-to-bottom, left-to-right.
pub fn parse_layout(boxes: &[TextBox]) -> Vec<ParsedEntry> {
    let boxes: Vec<&TextBox> = boxes
        .iter()
        .filter(|b| !clean_text(&b.text).is_empty())
        .collect();
    if boxes.is_empty() {
        return Vec::new();
    }

    let mut entries: Vec<(f64, f64, ParsedEntry)> = Vec::new();
    for column in split_columns(&boxes) {
        let lines = cluster_lines(&column);
        for card in group_cards(&lines) {
            entries.extend(parse_card_entries(card));
        }
    }

    entries.sort_by(|a, b| (a.0, a.1).partial_cmp(&(b.0, b.1)).unwrap_or(std::cmp::Ordering::Equal));
    entries.into_iter().map(|(_, _, entry)| entry).collect()
}

fn clean_text(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_time_range(text: &str) -> Option<(String, String)> {
    let captures = TIME_RANGE_RE.captures(text)?;
    let start = normalize_time(&captures[1], &captures[2])?;
    match (captures.get(3), captures.get(4)) {
        (Some(end_hour), Some(end_minute)) => {
            let end = normalize_time(end_hour.as_str(), end_minute.as_str())?;
            Some((start, end))
        }
        _ => Some((start.clone(), start)),
    }
}

fn normalize_time(hour_text: &str, minute_text: &str) -> Option<String> {
    let hour: u32 = hour_text.parse().ok()?;
    let minute: u32 = minute_text.parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(format!("{hour:02}:{minute:02}"))
}

fn sort_reading_order<'a>(boxes: &[&'a TextBox]) -> Vec<&'a TextBox> {
    let mut sorted = boxes.to_vec();
    sorted.sort_by(|a, b| {
        (a.y, a.x)
            .partial_cmp(&(b.y, b.x))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted
}

/// Two-pane screenshots split on the single dominant center gap; anything
/// else stays one column.
fn split_columns<'a>(boxes: &[&'a TextBox]) -> Vec<Vec<&'a TextBox>> {
    if boxes.len() < 4 {
        return vec![sort_reading_order(boxes)];
    }

    let mut centers: Vec<f64> = boxes.iter().map(|b| b.x + b.w / 2.0).collect();
    centers.sort_by(f64::total_cmp);
    let widths: Vec<f64> = boxes.iter().map(|b| b.w.max(1.0)).collect();
    let median_width = median(&widths);

    let mut largest_gap = -1.0_f64;
    let mut split_index = None;
    for index in 0..centers.len() - 1 {
        let gap = centers[index + 1] - centers[index];
        if gap > largest_gap {
            largest_gap = gap;
            split_index = Some(index);
        }
    }

    let threshold = (median_width * 1.8).max(120.0);
    let Some(split_index) = split_index.filter(|_| largest_gap > threshold) else {
        return vec![sort_reading_order(boxes)];
    };

    let boundary = (centers[split_index] + centers[split_index + 1]) / 2.0;
    let (left, right): (Vec<&TextBox>, Vec<&TextBox>) = boxes
        .iter()
        .copied()
        .partition(|b| b.x + b.w / 2.0 <= boundary);
    if left.len() < 2 || right.len() < 2 {
        return vec![sort_reading_order(boxes)];
    }

    let mut columns = vec![sort_reading_order(&left), sort_reading_order(&right)];
    columns.sort_by(|a, b| {
        let min_x = |column: &[&TextBox]| {
            column
                .iter()
                .map(|b| b.x)
                .fold(f64::INFINITY, f64::min)
        };
        min_x(a).partial_cmp(&min_x(b)).unwrap_or(std::cmp::Ordering::Equal)
    });
    columns
}

fn cluster_lines(boxes: &[&TextBox]) -> Vec<Line> {
    if boxes.is_empty() {
        return Vec::new();
    }

    let sorted = sort_reading_order(boxes);
    let heights: Vec<f64> = sorted.iter().map(|b| b.h.max(1.0)).collect();
    let threshold = (median(&heights) * 0.6).max(8.0);

    let mut groups: Vec<Vec<&TextBox>> = Vec::new();
    let mut current: Vec<&TextBox> = Vec::new();
    let mut current_center = 0.0;
    for b in sorted {
        let center = b.y + b.h / 2.0;
        if current.is_empty() {
            current.push(b);
            current_center = center;
            continue;
        }
        if (center - current_center).abs() <= threshold {
            current.push(b);
            let count = current.len() as f64;
            current_center = (current_center * (count - 1.0) + center) / count;
        } else {
            groups.push(std::mem::take(&mut current));
            current.push(b);
            current_center = center;
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }

    let mut lines = Vec::new();
    for mut group in groups {
        group.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));
        let text = clean_text(
            &group
                .iter()
                .map(|b| clean_text(&b.text))
                .collect::<Vec<_>>()
                .join(" "),
        );
        if text.is_empty() {
            continue;
        }
        let heights: Vec<f64> = group.iter().map(|b| b.h.max(1.0)).collect();
        lines.push(Line {
            text,
            x: group.iter().map(|b| b.x).fold(f64::INFINITY, f64::min),
            y: group.iter().map(|b| b.y).fold(f64::INFINITY, f64::min),
            h: median(&heights),
        });
    }
    lines.sort_by(|a, b| {
        (a.y, a.x)
            .partial_cmp(&(b.y, b.x))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    lines
}

fn group_cards(lines: &[Line]) -> Vec<&[Line]> {
    if lines.is_empty() {
        return Vec::new();
    }

    let heights: Vec<f64> = lines.iter().map(|l| l.h.max(1.0)).collect();
    let gap_threshold = (median(&heights) * 1.8).max(24.0);

    let mut cards = Vec::new();
    let mut card_start = 0;
    for index in 1..lines.len() {
        let gap = lines[index].y - lines[index - 1].y;
        if gap > gap_threshold {
            cards.push(&lines[card_start..index]);
            card_start = index;
        }
    }
    cards.push(&lines[card_start..]);
    cards
}

fn parse_card_entries(lines: &[Line]) -> Vec<(f64, f64, ParsedEntry)> {
    let time_lines: Vec<(usize, (String, String))> = lines
        .iter()
        .enumerate()
        .filter_map(|(index, line)| parse_time_range(&line.text).map(|t| (index, t)))
        .collect();
    // A card without a time line is UI chrome, not a schedule entry.
    if time_lines.is_empty() {
        return Vec::new();
    }

    let mut results = Vec::new();
    for (position, (time_index, times)) in time_lines.iter().enumerate() {
        let previous_time = if position > 0 {
            time_lines[position - 1].0 as isize
        } else {
            -1
        };
        let next_time = time_lines
            .get(position + 1)
            .map_or(lines.len(), |(index, _)| *index);

        let text_line = |index: usize| parse_time_range(&lines[index].text).is_none();
        let before: Vec<usize> = ((previous_time + 1) as usize..*time_index)
            .filter(|&index| text_line(index))
            .collect();
        let after: Vec<usize> = (*time_index + 1..next_time)
            .filter(|&index| text_line(index))
            .collect();

        let (title_parts, trailing): (Vec<usize>, Vec<usize>) =
            if !before.is_empty() && (position == 0 || after.is_empty()) {
                // Title lines can sit above the first time line of a card.
                (before, after)
            } else if !after.is_empty() {
                (vec![after[0]], after[1..].to_vec())
            } else if !before.is_empty() {
                (vec![*before.last().expect("non-empty")], Vec::new())
            } else {
                (Vec::new(), Vec::new())
            };

        let title = clean_text(
            &title_parts
                .iter()
                .map(|&index| lines[index].text.clone())
                .collect::<Vec<_>>()
                .join(" "),
        );
        if title.is_empty() {
            continue;
        }

        let trailing_texts: Vec<String> =
            trailing.iter().map(|&index| lines[index].text.clone()).collect();
        let (address, location) = match trailing_texts.len() {
            0 => (String::new(), String::new()),
            1 => (String::new(), trailing_texts[0].clone()),
            n => (trailing_texts[..n - 1].join(" "), trailing_texts[n - 1].clone()),
        };

        let anchor = &lines[*time_index];
        results.push((
            anchor.y,
            anchor.x,
            ParsedEntry {
                start: times.0.clone(),
                end: times.1.clone(),
                title,
                location,
                address,
            },
        ));
    }
    results
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    match sorted.len() {
        0 => 0.0,
        n if n % 2 == 1 => sorted[n / 2],
        n => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
    }
}
