//! Error types for trip detection and the storage layer.

use thiserror::Error;

/// Failure reported by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors that abort a whole detection run.
///
/// Per-trip failures (location lookup, season annotation, a single trip
/// insert, notification delivery) are logged and never surface here.
#[derive(Debug, Error)]
pub enum TripError {
    #[error("unknown clustering algorithm '{0}' (valid algorithms: timegap, hdbscan)")]
    UnknownAlgorithm(String),

    #[error("invalid value for {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("failed to fetch candidate photos: {0}")]
    CandidateFetch(#[source] StoreError),

    #[error("failed to delete existing trips: {0}")]
    DeleteTrips(#[source] StoreError),
}

impl TripError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        TripError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
