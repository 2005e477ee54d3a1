//! Trip detection: clustering strategies, distance model, place naming and
//! the detection run that ties them to the photo index.

pub mod candidates;
pub mod detection;
pub mod distance;
pub mod hdbscan;
pub mod places;
pub mod season;
pub mod timeframe;
pub mod timegap;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TripError;

pub use detection::{DetectOptions, TripDetector};
pub use hdbscan::DensityClusterer;
pub use places::{resolve_location, UNKNOWN_LOCATION};
pub use season::{SeasonAnnotator, SeasonDetector};
pub use timegap::TimeGapClusterer;

/// Default maximum gap between two photos of the same trip (two days).
pub const DEFAULT_MAX_TIME_GAP: i64 = 172_800;
pub const DEFAULT_MIN_PHOTOS: usize = 5;
pub const DEFAULT_TIME_WEIGHT: f64 = 0.7;
pub const DEFAULT_LOCATION_WEIGHT: f64 = 0.3;
pub const DEFAULT_SELECTION_EPSILON: f64 = 0.05;

/// A photo taking part in clustering.
#[derive(Debug, Clone, PartialEq)]
pub struct Photo {
    pub fileid: i64,
    /// Capture time in epoch seconds.
    pub timestamp: i64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// Location label set upstream that overrides boundary-based naming.
    pub forced_location: Option<String>,
}

impl Photo {
    pub fn new(fileid: i64, timestamp: i64) -> Self {
        Self {
            fileid,
            timestamp,
            lat: None,
            lon: None,
            forced_location: None,
        }
    }

    pub fn with_location(mut self, lat: f64, lon: f64) -> Self {
        self.lat = Some(lat);
        self.lon = Some(lon);
        self
    }

    /// Coordinates, if the photo is geotagged. `(0, 0)` counts as untagged.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) if !(lat == 0.0 && lon == 0.0) => Some((lat, lon)),
            _ => None,
        }
    }

    pub fn is_geotagged(&self) -> bool {
        self.coordinates().is_some()
    }
}

/// An administrative boundary a photo's coordinates fall inside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceMembership {
    pub osm_id: i64,
    pub name: String,
    /// OSM admin level: 2 = country, 4 = state, 6-8 = city-like.
    pub admin_level: i32,
}

/// Parameters shared by all clustering strategies.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterParams {
    pub min_photos: usize,
    /// Seconds. Only used by the time-gap strategy.
    pub max_time_gap: i64,
    pub time_weight: f64,
    pub location_weight: f64,
    /// Clusters born below this combined distance are merged upwards.
    pub selection_epsilon: f64,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            min_photos: DEFAULT_MIN_PHOTOS,
            max_time_gap: DEFAULT_MAX_TIME_GAP,
            time_weight: DEFAULT_TIME_WEIGHT,
            location_weight: DEFAULT_LOCATION_WEIGHT,
            selection_epsilon: DEFAULT_SELECTION_EPSILON,
        }
    }
}

/// Groups a time-ordered photo list into disjoint trip candidates.
///
/// Every returned group has at least `params.min_photos` members, groups are
/// ordered by their first photo and each group is in chronological order.
/// Photos that fit no qualifying group are left out.
pub trait TripClusterer {
    fn name(&self) -> &'static str;

    fn cluster(&self, photos: &[Photo], params: &ClusterParams) -> Vec<Vec<Photo>>;
}

/// Available clustering strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    #[default]
    TimeGap,
    Hdbscan,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::TimeGap => "timegap",
            Algorithm::Hdbscan => "hdbscan",
        }
    }

    /// Build the clusterer for this strategy.
    pub fn clusterer(&self) -> Box<dyn TripClusterer> {
        match self {
            Algorithm::TimeGap => Box::new(TimeGapClusterer),
            Algorithm::Hdbscan => Box::new(DensityClusterer::default()),
        }
    }
}

impl FromStr for Algorithm {
    type Err = TripError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "timegap" => Ok(Algorithm::TimeGap),
            "hdbscan" => Ok(Algorithm::Hdbscan),
            _ => Err(TripError::UnknownAlgorithm(s.to_string())),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort photos chronologically, lower fileid first on equal timestamps.
pub(crate) fn sort_chronologically(photos: &mut [Photo]) {
    photos.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.fileid.cmp(&b.fileid))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("timegap".parse::<Algorithm>().unwrap(), Algorithm::TimeGap);
        assert_eq!("HDBSCAN".parse::<Algorithm>().unwrap(), Algorithm::Hdbscan);

        let err = "kmeans".parse::<Algorithm>().unwrap_err();
        assert!(matches!(err, TripError::UnknownAlgorithm(ref name) if name == "kmeans"));
    }

    #[test]
    fn test_factory_builds_selected_strategy() {
        assert_eq!(Algorithm::TimeGap.clusterer().name(), "timegap");
        assert_eq!(Algorithm::Hdbscan.clusterer().name(), "hdbscan");
    }

    #[test]
    fn test_null_island_is_not_a_location() {
        let photo = Photo::new(1, 100).with_location(0.0, 0.0);
        assert!(!photo.is_geotagged());

        let photo = Photo::new(2, 100).with_location(0.0, 12.5);
        assert_eq!(photo.coordinates(), Some((0.0, 12.5)));
    }
}
