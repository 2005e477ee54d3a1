//! The detection run: candidates in, persisted trips and a notification out.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::candidates::{prepare_candidates, PathFilter};
use super::distance::trip_distance_km;
use super::places::{resolve_location, UNKNOWN_LOCATION};
use super::season::SeasonAnnotator;
use super::timeframe::format_timeframe;
use super::{
    sort_chronologically, Algorithm, ClusterParams, Photo, DEFAULT_LOCATION_WEIGHT,
    DEFAULT_MAX_TIME_GAP, DEFAULT_MIN_PHOTOS, DEFAULT_SELECTION_EPSILON, DEFAULT_TIME_WEIGHT,
};
use crate::db::{NewTrip, TripBackend};
use crate::error::TripError;
use crate::notify::{CreatedTrip, Notification, NotificationSink};

const SECONDS_PER_DAY: i64 = 86_400;

/// Options of one detection run.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectOptions {
    /// Delete every trip in scope and re-cluster all candidates.
    pub force: bool,
    /// Seconds. Time-gap strategy only.
    pub max_time_gap: i64,
    pub min_photos: usize,
    pub algorithm: Algorithm,
    pub time_weight: f64,
    pub location_weight: f64,
    /// Limit the run to one user's photos. Notifications are only sent for
    /// user-scoped runs.
    pub user: Option<String>,
    pub selection_epsilon: f64,
    /// Defer trips whose newest photo is younger than this many days.
    pub settle_days: Option<u32>,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            force: false,
            max_time_gap: DEFAULT_MAX_TIME_GAP,
            min_photos: DEFAULT_MIN_PHOTOS,
            algorithm: Algorithm::default(),
            time_weight: DEFAULT_TIME_WEIGHT,
            location_weight: DEFAULT_LOCATION_WEIGHT,
            user: None,
            selection_epsilon: DEFAULT_SELECTION_EPSILON,
            settle_days: None,
        }
    }
}

impl DetectOptions {
    /// Check the options and derive the clustering parameters.
    pub fn cluster_params(&self) -> Result<ClusterParams, TripError> {
        if self.min_photos == 0 {
            return Err(TripError::invalid("min_photos", "must be at least 1"));
        }
        if self.max_time_gap < 0 {
            return Err(TripError::invalid("max_time_gap", "must not be negative"));
        }
        check_weight("time_weight", self.time_weight)?;
        check_weight("location_weight", self.location_weight)?;
        if self.time_weight + self.location_weight <= 0.0 {
            return Err(TripError::invalid(
                "time_weight",
                "time and location weights must not both be zero",
            ));
        }
        if !self.selection_epsilon.is_finite() || self.selection_epsilon < 0.0 {
            return Err(TripError::invalid(
                "selection_epsilon",
                format!("{} is not a non-negative number", self.selection_epsilon),
            ));
        }

        Ok(ClusterParams {
            min_photos: self.min_photos,
            max_time_gap: self.max_time_gap,
            time_weight: self.time_weight,
            location_weight: self.location_weight,
            selection_epsilon: self.selection_epsilon,
        })
    }
}

fn check_weight(name: &'static str, value: f64) -> Result<(), TripError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(TripError::invalid(name, format!("{value} is outside 0.0..=1.0")))
    }
}

/// Runs trip detection against a backend.
pub struct TripDetector<'a> {
    backend: &'a dyn TripBackend,
    seasons: &'a dyn SeasonAnnotator,
    notifier: &'a dyn NotificationSink,
    filter: PathFilter,
    now: Option<i64>,
}

impl<'a> TripDetector<'a> {
    pub fn new(
        backend: &'a dyn TripBackend,
        seasons: &'a dyn SeasonAnnotator,
        notifier: &'a dyn NotificationSink,
    ) -> Self {
        Self {
            backend,
            seasons,
            notifier,
            filter: PathFilter::default(),
            now: None,
        }
    }

    pub fn with_path_filter(mut self, filter: PathFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Pin the clock used by the settle window.
    pub fn at_time(mut self, now: i64) -> Self {
        self.now = Some(now);
        self
    }

    fn now(&self) -> i64 {
        self.now.unwrap_or_else(|| Utc::now().timestamp())
    }

    /// Detect and store trips, returning how many were created.
    ///
    /// Invalid options, a failed candidate fetch and a failed force-mode
    /// deletion abort the run. Anything that goes wrong for a single trip is
    /// logged and skipped.
    pub fn detect_trips(&self, options: &DetectOptions) -> Result<usize, TripError> {
        let params = options.cluster_params()?;
        let clusterer = options.algorithm.clusterer();
        let scope = options.user.as_deref();

        info!(
            "Detecting trips for {} with {} (force: {}, min photos: {})",
            scope.unwrap_or("all users"),
            clusterer.name(),
            options.force,
            params.min_photos
        );

        let rows = self
            .backend
            .fetch_candidates(scope, !options.force)
            .map_err(TripError::CandidateFetch)?;
        let candidates = prepare_candidates(rows, &self.filter);

        let mut groups: Vec<(String, Vec<Photo>)> = Vec::new();
        for (user, photos) in &candidates {
            let found = clusterer.cluster(photos, &params);
            debug!("{} candidate trips for {}", found.len(), user);
            groups.extend(found.into_iter().map(|group| (user.clone(), group)));
        }

        if let Some(days) = options.settle_days.filter(|&d| d > 0) {
            let cutoff = self.now() - i64::from(days) * SECONDS_PER_DAY;
            groups.retain(|(user, group)| {
                let newest = group.iter().map(|p| p.timestamp).max().unwrap_or(0);
                let settled = newest <= cutoff;
                if !settled {
                    debug!(
                        "Deferring trip of {} photos for {}: newest photo is within {} days",
                        group.len(),
                        user,
                        days
                    );
                }
                settled
            });
        }

        if options.force {
            let deleted = self
                .backend
                .delete_trips(scope)
                .map_err(TripError::DeleteTrips)?;
            info!("Deleted {} existing trips", deleted);
        }

        let created: Vec<CreatedTrip> = groups
            .into_iter()
            .filter_map(|(user, group)| self.save_trip(&user, group))
            .collect();

        if let Some(user) = scope {
            self.send_notification(user, &created);
        }

        info!("Created {} trips", created.len());
        Ok(created.len())
    }

    fn save_trip(&self, user: &str, mut photos: Vec<Photo>) -> Option<CreatedTrip> {
        sort_chronologically(&mut photos);
        let start = photos.first()?.timestamp;
        let end = photos.last()?.timestamp;

        let geotagged = photos.iter().filter(|p| p.is_geotagged()).count();
        let distance_km = if geotagged > 1 {
            trip_distance_km(&photos)
        } else {
            0.0
        };

        let location = self.location_for(&photos);
        let phrase = match self.seasons.identify(start, end, &location) {
            Ok(phrase) => phrase.filter(|p| !p.trim().is_empty()),
            Err(e) => {
                warn!("Season lookup failed for trip at {}: {:#}", location, e);
                None
            }
        };
        let descriptive_name = match phrase {
            Some(phrase) => format!("{} in {}", phrase, location),
            None => location.clone(),
        };

        let trip = NewTrip {
            user_id: user.to_string(),
            start_date: start,
            end_date: end,
            distance_km,
            location,
            descriptive_name,
            timeframe: format_timeframe(start, end),
        };
        let photo_ids: Vec<i64> = photos.iter().map(|p| p.fileid).collect();

        match self.backend.insert_trip(&trip, &photo_ids) {
            Ok(id) => {
                info!(
                    "Created trip {} '{}' with {} photos ({:.1} km)",
                    id,
                    trip.descriptive_name,
                    photo_ids.len(),
                    trip.distance_km
                );
                Some(CreatedTrip {
                    id,
                    name: trip.descriptive_name,
                    photo_count: photo_ids.len(),
                })
            }
            Err(e) => {
                warn!(
                    "Failed to save trip '{}' ({} photos): {}",
                    trip.descriptive_name,
                    photo_ids.len(),
                    e
                );
                None
            }
        }
    }

    fn location_for(&self, photos: &[Photo]) -> String {
        let has_forced = photos
            .iter()
            .any(|p| p.forced_location.as_deref().is_some_and(|l| !l.is_empty()));
        let ids: Vec<i64> = photos
            .iter()
            .filter(|p| p.is_geotagged())
            .map(|p| p.fileid)
            .collect();

        let memberships = if has_forced || ids.is_empty() {
            HashMap::new()
        } else {
            match self.backend.place_memberships(&ids) {
                Ok(memberships) => memberships,
                Err(e) => {
                    warn!("Place lookup failed for {} photos: {}", ids.len(), e);
                    return UNKNOWN_LOCATION.to_string();
                }
            }
        };

        resolve_location(photos, &memberships)
    }

    fn send_notification(&self, user: &str, created: &[CreatedTrip]) {
        let Some(notification) = Notification::for_trips(user, created) else {
            return;
        };
        match self.notifier.notify(&notification) {
            Ok(()) => debug!("Sent '{}' notification to {}", notification.subject, user),
            Err(e) => warn!("Failed to notify {}: {:#}", user, e),
        }
    }
}
