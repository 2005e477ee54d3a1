//! Sequential time-gap splitting.

use tracing::debug;

use super::{sort_chronologically, ClusterParams, Photo, TripClusterer};

/// Splits the photo stream wherever two consecutive photos are more than
/// `max_time_gap` seconds apart. Location is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeGapClusterer;

impl TripClusterer for TimeGapClusterer {
    fn name(&self) -> &'static str {
        "timegap"
    }

    fn cluster(&self, photos: &[Photo], params: &ClusterParams) -> Vec<Vec<Photo>> {
        debug!(
            "Starting time-gap clustering of {} photos (max gap {}s, min photos {})",
            photos.len(),
            params.max_time_gap,
            params.min_photos
        );

        let mut sorted = photos.to_vec();
        sort_chronologically(&mut sorted);

        let mut trips = Vec::new();
        let mut current: Vec<Photo> = Vec::new();

        for photo in sorted {
            if let Some(last) = current.last() {
                let gap = photo.timestamp - last.timestamp;
                if gap > params.max_time_gap {
                    debug!("Gap of {}s before photo {}, closing trip", gap, photo.fileid);
                    close_trip(&mut trips, std::mem::take(&mut current), params.min_photos);
                }
            }
            current.push(photo);
        }
        close_trip(&mut trips, current, params.min_photos);

        debug!("Time-gap clustering found {} trips", trips.len());
        trips
    }
}

fn close_trip(trips: &mut Vec<Vec<Photo>>, trip: Vec<Photo>, min_photos: usize) {
    if trip.is_empty() {
        return;
    }
    if trip.len() >= min_photos {
        trips.push(trip);
    } else {
        debug!("Discarding {} photos (minimum is {})", trip.len(), min_photos);
    }
}
