//! Tracked entities and marker payloads

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use orbital_mechanics::GeodeticPosition;
use track_feeds::{CameraMarker, EarthquakeFeature, FlightState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Satellite,
    Flight,
    Earthquake,
    Camera,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Satellite => "satellite",
            Self::Flight => "flight",
            Self::Earthquake => "earthquake",
            Self::Camera => "camera",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtraValue {
    Number(f64),
    Text(String),
}

/// The single selected object the overlay follows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntity {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
    pub lat: f64,
    pub lon: f64,
    pub altitude_m: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading_deg: Option<f64>,
    #[serde(default)]
    pub extra: BTreeMap<String, ExtraValue>,
}

impl TrackedEntity {
    /// NORAD catalog number, present on satellites.
    pub fn norad_id(&self) -> Option<u64> {
        match self.extra.get("noradId") {
            Some(ExtraValue::Number(id)) => Some(*id as u64),
            _ => None,
        }
    }
}

/// Back-reference carried by every rendered marker. Holds exactly what a pick
/// needs to become a [`TrackedEntity`], so no second lookup happens.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MarkerPayload {
    Satellite {
        name: String,
        norad_id: u64,
        position: GeodeticPosition,
    },
    Flight {
        icao24: String,
        callsign: String,
        lat: f64,
        lon: f64,
        altitude_m: f64,
        velocity: f64,
        heading_deg: f64,
        military: bool,
    },
    Earthquake {
        id: String,
        title: String,
        lat: f64,
        lon: f64,
        magnitude: f64,
        depth_km: f64,
    },
    Camera(CameraMarker),
}

impl MarkerPayload {
    pub fn satellite(name: &str, norad_id: u64, position: GeodeticPosition) -> Self {
        Self::Satellite {
            name: name.to_string(),
            norad_id,
            position,
        }
    }

    /// Payload for a flight with a usable position. `military` reflects the
    /// feed the record came from.
    pub fn flight(flight: &FlightState, military: bool) -> Option<Self> {
        let (lat, lon) = flight.position()?;
        Some(Self::Flight {
            icao24: flight.icao24.clone(),
            callsign: flight.display_name().to_string(),
            lat,
            lon,
            altitude_m: flight.altitude_m,
            velocity: flight.velocity,
            heading_deg: flight.heading_deg,
            military: military || flight.is_military,
        })
    }

    pub fn earthquake(quake: &EarthquakeFeature) -> Self {
        Self::Earthquake {
            id: quake.id.clone(),
            title: quake.title(),
            lat: quake.lat,
            lon: quake.lon,
            magnitude: quake.magnitude,
            depth_km: quake.depth_km,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Satellite { .. } => EntityKind::Satellite,
            Self::Flight { .. } => EntityKind::Flight,
            Self::Earthquake { .. } => EntityKind::Earthquake,
            Self::Camera(_) => EntityKind::Camera,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Satellite { name, .. } => name,
            Self::Flight { icao24, .. } => icao24,
            Self::Earthquake { id, .. } => id,
            Self::Camera(camera) => &camera.id,
        }
    }

    /// Canonical tracked form. Cameras open a detail view instead of being
    /// tracked, so they yield `None`.
    pub fn to_tracked(&self) -> Option<TrackedEntity> {
        let entity = match self {
            // Names repeat across the catalog (debris keeps its parent's
            // name); `noradId` in `extra` breaks the tie.
            Self::Satellite { name, norad_id, position } => TrackedEntity {
                id: name.clone(),
                name: name.clone(),
                kind: EntityKind::Satellite,
                lat: position.latitude,
                lon: position.longitude,
                altitude_m: position.altitude_m,
                velocity: None,
                heading_deg: None,
                extra: BTreeMap::from([("noradId".to_string(), ExtraValue::Number(*norad_id as f64))]),
            },
            Self::Flight {
                icao24,
                callsign,
                lat,
                lon,
                altitude_m,
                velocity,
                heading_deg,
                military,
            } => {
                let mut extra = BTreeMap::new();
                if *military {
                    extra.insert("isMilitary".to_string(), ExtraValue::Number(1.0));
                }
                TrackedEntity {
                    id: icao24.clone(),
                    name: callsign.clone(),
                    kind: EntityKind::Flight,
                    lat: *lat,
                    lon: *lon,
                    altitude_m: *altitude_m,
                    velocity: Some(*velocity),
                    heading_deg: Some(*heading_deg),
                    extra,
                }
            }
            Self::Earthquake {
                id,
                title,
                lat,
                lon,
                magnitude,
                depth_km,
            } => TrackedEntity {
                id: id.clone(),
                name: title.clone(),
                kind: EntityKind::Earthquake,
                lat: *lat,
                lon: *lon,
                altitude_m: -depth_km * 1000.0,
                velocity: None,
                heading_deg: None,
                extra: BTreeMap::from([
                    ("magnitude".to_string(), ExtraValue::Number(*magnitude)),
                    ("depth_km".to_string(), ExtraValue::Number(*depth_km)),
                ]),
            },
            Self::Camera(_) => return None,
        };
        Some(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flight(icao24: &str, callsign: &str) -> FlightState {
        FlightState {
            icao24: icao24.to_string(),
            callsign: callsign.to_string(),
            lat: Some(40.0),
            lon: Some(-73.0),
            altitude_m: 10_000.0,
            velocity: 230.0,
            heading_deg: 45.0,
            on_ground: false,
            is_military: false,
        }
    }

    #[test]
    fn test_flight_pick_becomes_tracked_entity() {
        let payload = MarkerPayload::flight(&flight("ABC123", ""), false).unwrap();
        let entity = payload.to_tracked().unwrap();

        assert_eq!(entity.id, "ABC123");
        assert_eq!(entity.kind, EntityKind::Flight);
        assert_eq!(entity.lat, 40.0);
        assert_eq!(entity.lon, -73.0);
        assert_eq!(entity.altitude_m, 10_000.0);
        assert_eq!(entity.name, "ABC123");
        assert!(entity.extra.is_empty());
    }

    #[test]
    fn test_military_flag_in_extra() {
        let state = flight("AE01CE", "RCH123");
        let entity = MarkerPayload::flight(&state, true).unwrap().to_tracked().unwrap();
        assert_eq!(entity.name, "RCH123");
        assert_eq!(entity.extra.get("isMilitary"), Some(&ExtraValue::Number(1.0)));
    }

    #[test]
    fn test_flight_without_position_has_no_payload() {
        let mut state = flight("ABC123", "X");
        state.lon = None;
        assert!(MarkerPayload::flight(&state, false).is_none());
    }

    #[test]
    fn test_earthquake_entity() {
        let quake = EarthquakeFeature {
            id: "us1".to_string(),
            magnitude: 5.1,
            depth_km: 12.0,
            lat: 1.0,
            lon: 2.0,
            place: "Offshore".to_string(),
        };
        let entity = MarkerPayload::earthquake(&quake).to_tracked().unwrap();
        assert_eq!(entity.kind, EntityKind::Earthquake);
        assert_eq!(entity.altitude_m, -12_000.0);
        assert_eq!(entity.extra["magnitude"], ExtraValue::Number(5.1));
    }

    #[test]
    fn test_camera_payload_not_tracked() {
        let payload = MarkerPayload::Camera(CameraMarker {
            id: "cam-1".to_string(),
            name: "Harbor".to_string(),
            lat: 0.0,
            lon: 0.0,
            source: None,
            slug: None,
            image_url: None,
            video_url: None,
            stream_type: None,
        });
        assert_eq!(payload.kind(), EntityKind::Camera);
        assert_eq!(payload.id(), "cam-1");
        assert!(payload.to_tracked().is_none());
    }

    #[test]
    fn test_extra_value_wire_format() {
        let json = serde_json::to_string(&ExtraValue::Number(1.0)).unwrap();
        assert_eq!(json, "1.0");
        let text: ExtraValue = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(text, ExtraValue::Text("abc".to_string()));
    }
}
