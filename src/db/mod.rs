mod schema;
pub mod backend;
pub mod sqlite;

pub use backend::{PhotoIndex, PlaceIndex, TripBackend, TripStore};
pub use schema::{MIGRATIONS, SCHEMA};

/// The database used by the binaries.
pub type Database = sqlite::SqliteDb;

/// Raw photo index row, before timestamp parsing and path filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoRow {
    pub id: i64,
    pub user_id: String,
    /// As stored by the ingestion pipeline; may be malformed.
    pub taken_at: Option<String>,
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
    pub path: String,
    pub location_override: Option<String>,
}

/// A photo to add to the index.
#[derive(Debug, Clone, Default)]
pub struct NewPhoto {
    pub user_id: String,
    pub path: String,
    pub taken_at: Option<String>,
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
    pub location_override: Option<String>,
}

/// Fields written for one detected trip.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrip {
    pub user_id: String,
    pub start_date: i64,
    pub end_date: i64,
    pub distance_km: f64,
    pub location: String,
    pub descriptive_name: String,
    pub timeframe: String,
}

#[derive(Debug, Clone)]
pub struct StoredNotification {
    pub id: i64,
    pub kind: String,
    pub subject: String,
    pub message: String,
    pub payload: Option<String>,
    pub created_at: String,
}

/// A stored trip with its photo count.
#[derive(Debug, Clone)]
pub struct TripSummary {
    pub id: i64,
    pub user_id: String,
    pub descriptive_name: String,
    pub location: String,
    pub start_date: i64,
    pub end_date: i64,
    pub timeframe: String,
    pub distance_km: f64,
    pub photo_count: usize,
    pub created_at: String,
}
