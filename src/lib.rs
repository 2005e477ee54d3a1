//! Trip detection over a geotagged photo index.
//!
//! Photos are grouped into trips by one of two strategies (a time-gap
//! splitter or density-based clustering over time and distance), named
//! from the administrative boundaries they fall inside and stored with
//! their member photos.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod notify;
pub mod trips;

pub use error::{StoreError, TripError};
