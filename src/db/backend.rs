//! Storage traits consumed by trip detection.
//!
//! The SQLite database implements all of them; tests swap in in-memory
//! fakes to exercise failure paths.

use std::collections::HashMap;

use super::{NewTrip, PhotoRow, TripSummary};
use crate::error::StoreError;
use crate::trips::PlaceMembership;

/// Read access to the photo index.
pub trait PhotoIndex {
    /// Photos with a capture time, optionally limited to one user.
    ///
    /// With `skip_assigned`, photos already belonging to a trip are left out.
    fn fetch_candidates(
        &self,
        user: Option<&str>,
        skip_assigned: bool,
    ) -> Result<Vec<PhotoRow>, StoreError>;

    /// Distinct owners of indexed photos.
    fn user_ids(&self) -> Result<Vec<String>, StoreError>;
}

/// Administrative boundary memberships, populated by reverse geocoding.
pub trait PlaceIndex {
    /// Memberships per photo id, each list ordered by admin level ascending.
    /// Photos without memberships are absent from the map.
    fn place_memberships(
        &self,
        photo_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<PlaceMembership>>, StoreError>;
}

/// Trip persistence.
pub trait TripStore {
    /// Insert a trip and its photo links atomically, returning the trip id.
    fn insert_trip(&self, trip: &NewTrip, photo_ids: &[i64]) -> Result<i64, StoreError>;

    /// Delete every trip of `user` (all users when `None`) with its photo
    /// links. Returns the number of trips removed.
    fn delete_trips(&self, user: Option<&str>) -> Result<usize, StoreError>;

    /// Stored trips, oldest first.
    fn list_trips(&self, user: Option<&str>) -> Result<Vec<TripSummary>, StoreError>;
}

/// Everything a detection run reads from and writes to.
pub trait TripBackend: PhotoIndex + PlaceIndex + TripStore {}

impl<T: PhotoIndex + PlaceIndex + TripStore> TripBackend for T {}
