//! Feed Records
//!
//! Wire shapes for the five live feeds. Each ingestion cycle replaces the
//! previous record set for its feed wholesale.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

pub use orbital_mechanics::OrbitalElementRecord;

/// Upstream feeds report missing numbers as `null`.
fn null_as_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Flights
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightState {
    pub icao24: String,
    #[serde(default)]
    pub callsign: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(rename = "altitude", alias = "altitudeMeters", default, deserialize_with = "null_as_zero")]
    pub altitude_m: f64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub velocity: f64,
    #[serde(rename = "heading", alias = "headingDegrees", default, deserialize_with = "null_as_zero")]
    pub heading_deg: f64,
    #[serde(default)]
    pub on_ground: bool,
    #[serde(default)]
    pub is_military: bool,
}

impl FlightState {
    /// (lat, lon) when both coordinates are present and finite.
    pub fn position(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some((lat, lon)),
            _ => None,
        }
    }

    /// Airborne with a usable position.
    pub fn is_renderable(&self) -> bool {
        !self.on_ground && self.position().is_some()
    }

    pub fn display_name(&self) -> &str {
        let callsign = self.callsign.trim();
        if callsign.is_empty() {
            &self.icao24
        } else {
            callsign
        }
    }
}

// ============================================================================
// Earthquakes
// ============================================================================

const MIN_FOOTPRINT_M: f64 = 30_000.0;
const FOOTPRINT_M_PER_MAGNITUDE: f64 = 60_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarthquakeFeature {
    pub id: String,
    #[serde(rename = "mag", alias = "magnitude")]
    pub magnitude: f64,
    #[serde(rename = "depth", alias = "depthKm", default, deserialize_with = "null_as_zero")]
    pub depth_km: f64,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub place: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityBand {
    Minor,
    Moderate,
    Major,
}

impl SeverityBand {
    pub fn from_magnitude(magnitude: f64) -> Self {
        if magnitude >= 6.0 {
            Self::Major
        } else if magnitude >= 4.0 {
            Self::Moderate
        } else {
            Self::Minor
        }
    }

    pub fn color_hex(&self) -> &'static str {
        match self {
            Self::Minor => "#ffaa00",
            Self::Moderate => "#ff6600",
            Self::Major => "#ff2200",
        }
    }
}

impl EarthquakeFeature {
    pub fn footprint_radius_m(&self) -> f64 {
        MIN_FOOTPRINT_M.max(self.magnitude * FOOTPRINT_M_PER_MAGNITUDE)
    }

    pub fn severity(&self) -> SeverityBand {
        SeverityBand::from_magnitude(self.magnitude)
    }

    pub fn title(&self) -> String {
        format!("M{} – {}", self.magnitude, self.place)
    }
}

// ============================================================================
// Camera catalog
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Hls,
    Mp4,
    Youtube,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraMarker {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub stream_type: Option<StreamType>,
}

impl CameraMarker {
    /// Catalog entries whose stream URL has to be resolved on demand.
    pub fn needs_stream_resolution(&self) -> bool {
        self.source.as_deref() == Some("openwebcamdb") && self.slug.is_some()
    }
}

/// Response of the deferred live-stream lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedStream {
    pub url: String,
    #[serde(rename = "type")]
    pub stream_type: StreamType,
}

// ============================================================================
// Feed kinds and payloads
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    OrbitalElements,
    Flights,
    MilitaryFlights,
    Earthquakes,
    Cameras,
}

impl FeedKind {
    pub const ALL: [FeedKind; 5] = [
        Self::OrbitalElements,
        Self::Flights,
        Self::MilitaryFlights,
        Self::Earthquakes,
        Self::Cameras,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrbitalElements => "orbital_elements",
            Self::Flights => "flights",
            Self::MilitaryFlights => "military_flights",
            Self::Earthquakes => "earthquakes",
            Self::Cameras => "cameras",
        }
    }

    /// Endpoint path relative to the feed base URL.
    pub fn path(&self) -> &'static str {
        match self {
            Self::OrbitalElements => "/api/satellites",
            Self::Flights => "/api/flights",
            Self::MilitaryFlights => "/api/military",
            Self::Earthquakes => "/api/earthquakes",
            Self::Cameras => "/api/cctv",
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedPayload {
    OrbitalElements(Vec<OrbitalElementRecord>),
    Flights(Vec<FlightState>),
    MilitaryFlights(Vec<FlightState>),
    Earthquakes(Vec<EarthquakeFeature>),
    Cameras(Vec<CameraMarker>),
}

impl FeedPayload {
    pub fn kind(&self) -> FeedKind {
        match self {
            Self::OrbitalElements(_) => FeedKind::OrbitalElements,
            Self::Flights(_) => FeedKind::Flights,
            Self::MilitaryFlights(_) => FeedKind::MilitaryFlights,
            Self::Earthquakes(_) => FeedKind::Earthquakes,
            Self::Cameras(_) => FeedKind::Cameras,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::OrbitalElements(v) => v.len(),
            Self::Flights(v) | Self::MilitaryFlights(v) => v.len(),
            Self::Earthquakes(v) => v.len(),
            Self::Cameras(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
