//! Track Feeds
//!
//! Record types, HTTP client and the per-feed ingestion scheduler for the
//! live sources behind the globe: orbital elements, civil and military
//! flights, earthquakes and the camera catalog.

pub mod client;
pub mod records;
pub mod scheduler;

pub use client::{FeedClient, FeedConfig, FeedSchedule};
pub use records::{
    CameraMarker, EarthquakeFeature, FeedKind, FeedPayload, FlightState, OrbitalElementRecord,
    ResolvedStream, SeverityBand, StreamType,
};
pub use scheduler::{
    FeedOutcome, FeedSource, FeedUpdate, IngestionHandle, IngestionScheduler, Liveness,
    LivenessGuard,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Feed {feed} returned status {status}")]
    Status { feed: String, status: u16 },

    #[error("Feed {feed} decode failed: {reason}")]
    Decode { feed: String, reason: String },

    #[error("Invalid feed configuration: {0}")]
    InvalidConfig(String),

    #[error("No stream URL for camera {0}")]
    EmptyStream(String),
}

pub type Result<T> = std::result::Result<T, FeedError>;
