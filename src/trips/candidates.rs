//! Turning photo index rows into clustering input.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime};
use tracing::{debug, warn};

use super::{sort_chronologically, Photo};
use crate::db::PhotoRow;

/// Directory names holding generated files rather than user photos.
pub fn default_excluded_dirs() -> Vec<String> {
    vec![
        "thumbnails".to_string(),
        ".thumbnails".to_string(),
        ".cache".to_string(),
    ]
}

/// Prefix of per-application storage directories, always excluded.
const APPDATA_PREFIX: &str = "appdata_";

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y:%m:%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Rejects photos stored in internal app-data or thumbnail locations.
#[derive(Debug, Clone)]
pub struct PathFilter {
    excluded_dirs: Vec<String>,
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::new(default_excluded_dirs())
    }
}

impl PathFilter {
    pub fn new(excluded_dirs: Vec<String>) -> Self {
        Self { excluded_dirs }
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        path.split(['/', '\\']).any(|component| {
            component.starts_with(APPDATA_PREFIX)
                || self.excluded_dirs.iter().any(|dir| dir == component)
        })
    }
}

/// Parse a stored capture time into epoch seconds (UTC).
///
/// Accepts epoch seconds, RFC 3339 and the `YYYY-MM-DD HH:MM:SS` and EXIF
/// `YYYY:MM:DD HH:MM:SS` forms.
pub fn parse_taken_at(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(epoch) = value.parse::<i64>() {
        return Some(epoch);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|dt| dt.and_utc().timestamp())
}

/// Convert index rows into chronologically sorted photos per owning user.
///
/// Rows with a missing, malformed or non-positive capture time and rows in
/// excluded locations are skipped.
pub fn prepare_candidates(rows: Vec<PhotoRow>, filter: &PathFilter) -> BTreeMap<String, Vec<Photo>> {
    let total = rows.len();
    let mut malformed = 0;
    let mut excluded = 0;
    let mut by_user: BTreeMap<String, Vec<Photo>> = BTreeMap::new();

    for row in rows {
        if filter.is_excluded(&row.path) {
            excluded += 1;
            continue;
        }

        let timestamp = match row.taken_at.as_deref().and_then(parse_taken_at) {
            Some(ts) if ts > 0 => ts,
            _ => {
                warn!("Skipping photo {}: unusable capture time {:?}", row.id, row.taken_at);
                malformed += 1;
                continue;
            }
        };

        let photo = Photo {
            fileid: row.id,
            timestamp,
            lat: row.gps_latitude,
            lon: row.gps_longitude,
            forced_location: row.location_override.filter(|l| !l.trim().is_empty()),
        };
        by_user.entry(row.user_id).or_default().push(photo);
    }

    for photos in by_user.values_mut() {
        sort_chronologically(photos);
    }

    debug!(
        "Prepared {} of {} candidate photos ({} malformed, {} in excluded locations)",
        total - malformed - excluded,
        total,
        malformed,
        excluded
    );
    by_user
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, user: &str, taken_at: Option<&str>, path: &str) -> PhotoRow {
        PhotoRow {
            id,
            user_id: user.to_string(),
            taken_at: taken_at.map(str::to_string),
            gps_latitude: None,
            gps_longitude: None,
            path: path.to_string(),
            location_override: None,
        }
    }

    #[test]
    fn test_parse_taken_at_formats() {
        assert_eq!(parse_taken_at("1704067200"), Some(1_704_067_200));
        assert_eq!(parse_taken_at("2024-01-01T00:00:00Z"), Some(1_704_067_200));
        assert_eq!(parse_taken_at("2024-01-01T02:00:00+02:00"), Some(1_704_067_200));
        assert_eq!(parse_taken_at("2024-01-01 00:00:00"), Some(1_704_067_200));
        assert_eq!(parse_taken_at("2024:01:01 00:00:00"), Some(1_704_067_200));
        assert_eq!(parse_taken_at(" 2024-01-01T00:00:00 "), Some(1_704_067_200));
        assert_eq!(parse_taken_at("yesterday"), None);
        assert_eq!(parse_taken_at(""), None);
    }

    #[test]
    fn test_path_filter() {
        let filter = PathFilter::default();
        assert!(filter.is_excluded("/data/appdata_oc123/preview/1.jpg"));
        assert!(filter.is_excluded("/home/alice/.thumbnails/large/x.png"));
        assert!(filter.is_excluded("photos/thumbnails/x.jpg"));
        assert!(!filter.is_excluded("/home/alice/Photos/thumbnails_of_paris.jpg"));
        assert!(!filter.is_excluded("/home/alice/Photos/2024/paris.jpg"));

        let custom = PathFilter::new(vec!["previews".to_string()]);
        assert!(custom.is_excluded("/srv/previews/a.jpg"));
        assert!(!custom.is_excluded("/srv/thumbnails/a.jpg"));
    }

    #[test]
    fn test_prepare_candidates_skips_bad_rows() {
        let rows = vec![
            row(3, "alice", Some("1704070800"), "/p/3.jpg"),
            row(1, "alice", Some("1704067200"), "/p/1.jpg"),
            row(2, "alice", Some("garbage"), "/p/2.jpg"),
            row(4, "alice", Some("0"), "/p/4.jpg"),
            row(5, "alice", None, "/p/5.jpg"),
            row(6, "alice", Some("1704067300"), "/appdata_x/6.jpg"),
            row(7, "bob", Some("1704067200"), "/b/7.jpg"),
        ];

        let by_user = prepare_candidates(rows, &PathFilter::default());
        let alice: Vec<i64> = by_user["alice"].iter().map(|p| p.fileid).collect();
        assert_eq!(alice, vec![1, 3]);
        assert_eq!(by_user["bob"].len(), 1);
    }

    #[test]
    fn test_override_becomes_forced_location() {
        let mut with_label = row(1, "alice", Some("10"), "/p/1.jpg");
        with_label.location_override = Some("Lake Bled".to_string());
        let mut blank = row(2, "alice", Some("20"), "/p/2.jpg");
        blank.location_override = Some("  ".to_string());

        let by_user = prepare_candidates(vec![with_label, blank], &PathFilter::default());
        let photos = &by_user["alice"];
        assert_eq!(photos[0].forced_location.as_deref(), Some("Lake Bled"));
        assert_eq!(photos[1].forced_location, None);
    }
}
