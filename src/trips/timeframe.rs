//! Human-readable trip timeframes ("Mar 5 - 9, 2024").

use chrono::{DateTime, Datelike, Utc};

pub const UNKNOWN_TIMEFRAME: &str = "Unknown";

/// Format a trip span, collapsing the year, month and day parts the two
/// ends share. Dates are rendered in UTC.
pub fn format_timeframe(start: i64, end: i64) -> String {
    if start <= 0 || end <= 0 {
        return UNKNOWN_TIMEFRAME.to_string();
    }
    let (Some(start), Some(end)) = (to_date(start), to_date(end)) else {
        return UNKNOWN_TIMEFRAME.to_string();
    };

    if start.year() != end.year() {
        return format!("{} - {}", start.format("%b %-d, %Y"), end.format("%b %-d, %Y"));
    }
    if start.month() != end.month() {
        return format!("{} - {}", start.format("%b %-d"), end.format("%b %-d, %Y"));
    }
    if start.day() != end.day() {
        return format!("{} - {}", start.format("%b %-d"), end.format("%-d, %Y"));
    }
    start.format("%b %-d, %Y").to_string()
}

fn to_date(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
}
