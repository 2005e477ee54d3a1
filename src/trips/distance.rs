//! Great-circle distance and the combined time/space metric.

use super::Photo;

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Seconds of capture-time difference that weigh as much as one kilometre:
/// one day is equivalent to one kilometre.
pub const SECONDS_PER_KM: f64 = 86_400.0;

/// Great-circle distance between two coordinates in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Distance between two photos in kilometres, 0 unless both are geotagged.
pub fn spatial_km(a: &Photo, b: &Photo) -> f64 {
    match (a.coordinates(), b.coordinates()) {
        (Some((lat1, lon1)), Some((lat2, lon2))) => haversine_km(lat1, lon1, lat2, lon2),
        _ => 0.0,
    }
}

/// Capture-time difference expressed in kilometre equivalents.
pub fn time_km(a: &Photo, b: &Photo) -> f64 {
    (a.timestamp - b.timestamp).unsigned_abs() as f64 / SECONDS_PER_KM
}

/// Weighted time + space distance used by the density clusterer.
pub fn combined_distance(a: &Photo, b: &Photo, time_weight: f64, location_weight: f64) -> f64 {
    time_weight * time_km(a, b) + location_weight * spatial_km(a, b)
}

/// Total distance travelled over a trip, in kilometres.
///
/// Hops are summed between consecutive geotagged photos in the order given,
/// which callers keep chronological. Untagged photos are skipped without
/// breaking the chain.
pub fn trip_distance_km(photos: &[Photo]) -> f64 {
    let mut total = 0.0;
    let mut previous: Option<(f64, f64)> = None;

    for (lat, lon) in photos.iter().filter_map(Photo::coordinates) {
        if let Some((prev_lat, prev_lon)) = previous {
            total += haversine_km(prev_lat, prev_lon, lat, lon);
        }
        previous = Some((lat, lon));
    }

    total
}
