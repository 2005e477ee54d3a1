//! Season phrase for a trip, used as the prefix of its descriptive name.

use chrono::{DateTime, Datelike};
use tracing::debug;

/// Advisory annotator: a failure or `None` leaves the trip name as just
/// its location.
pub trait SeasonAnnotator {
    fn identify(&self, start: i64, end: i64, location: &str) -> anyhow::Result<Option<String>>;
}

/// Meteorological northern-hemisphere season of the trip's start date
/// (UTC), with an "Early" or "Late" qualifier near the season edges.
#[derive(Debug, Clone, Copy)]
pub struct SeasonDetector {
    pub enabled: bool,
}

impl Default for SeasonDetector {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl SeasonDetector {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl SeasonAnnotator for SeasonDetector {
    fn identify(&self, start: i64, _end: i64, _location: &str) -> anyhow::Result<Option<String>> {
        if !self.enabled {
            return Ok(None);
        }
        let Some(date) = DateTime::from_timestamp(start, 0) else {
            anyhow::bail!("timestamp {} is out of range", start);
        };

        let phrase = season_phrase(date.month(), date.day());
        debug!("Trip season identified as {}", phrase);
        Ok(Some(phrase))
    }
}

fn season_phrase(month: u32, day: u32) -> String {
    let (season, first_month) = match month {
        12 | 1 | 2 => ("Winter", 12),
        3..=5 => ("Spring", 3),
        6..=8 => ("Summer", 6),
        _ => ("Fall", 9),
    };
    let second_month = first_month % 12 + 1;
    let last_month = second_month % 12 + 1;

    if month == first_month || (month == second_month && day <= 10) {
        format!("Early {season}")
    } else if month == last_month && day > 15 {
        format!("Late {season}")
    } else {
        season.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(year: i32, month: u32, day: u32) -> i64 {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0)
            .unwrap()
            .timestamp()
    }

    fn identify(ts: i64) -> Option<String> {
        SeasonDetector::default().identify(ts, ts, "Anywhere").unwrap()
    }

    #[test]
    fn test_season_qualifiers() {
        assert_eq!(identify(at(2023, 12, 24)).as_deref(), Some("Early Winter"));
        assert_eq!(identify(at(2024, 1, 10)).as_deref(), Some("Early Winter"));
        assert_eq!(identify(at(2024, 1, 11)).as_deref(), Some("Winter"));
        assert_eq!(identify(at(2024, 2, 15)).as_deref(), Some("Winter"));
        assert_eq!(identify(at(2024, 2, 16)).as_deref(), Some("Late Winter"));
        assert_eq!(identify(at(2024, 4, 20)).as_deref(), Some("Spring"));
        assert_eq!(identify(at(2024, 6, 30)).as_deref(), Some("Early Summer"));
        assert_eq!(identify(at(2024, 8, 31)).as_deref(), Some("Late Summer"));
        assert_eq!(identify(at(2024, 10, 5)).as_deref(), Some("Early Fall"));
        assert_eq!(identify(at(2024, 11, 20)).as_deref(), Some("Late Fall"));
    }

    #[test]
    fn test_disabled_detector() {
        let detector = SeasonDetector::new(false);
        assert_eq!(detector.identify(at(2024, 7, 1), 0, "Rome").unwrap(), None);
    }

    #[test]
    fn test_out_of_range_timestamp_is_an_error() {
        assert!(SeasonDetector::default().identify(i64::MAX, i64::MAX, "").is_err());
    }
}
