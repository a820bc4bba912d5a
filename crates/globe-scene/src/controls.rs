//! Input controls
//!
//! Key bindings, per-city landmark shortcuts and geocoder fly-to heuristics.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::effects::EffectMode;
use crate::renderer::CameraFlight;

pub const LANDMARK_FLIGHT: Duration = Duration::from_millis(2500);
pub const CITY_FLIGHT: Duration = Duration::from_millis(3500);
pub const GEOCODE_FLIGHT: Duration = Duration::from_secs(3);

const LANDMARK_KEYS: [char; 5] = ['q', 'w', 'e', 'r', 't'];

const METERS_PER_DEGREE: f64 = 111_000.0;
const GEOCODE_PADDING: f64 = 2.0;
const GEOCODE_MIN_ALTITUDE_M: f64 = 500.0;
const GEOCODE_MAX_ALTITUDE_M: f64 = 18_000_000.0;
const GEOCODE_DEFAULT_ALTITUDE_M: f64 = 200_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    SelectMode(EffectMode),
    FlyToLandmark(char),
    ClearSelection,
}

/// Map a key name as delivered by the host (`"1"`, `"q"`, `"Escape"`).
pub fn key_action(key: &str) -> Option<KeyAction> {
    if key.eq_ignore_ascii_case("escape") || key.eq_ignore_ascii_case("esc") {
        return Some(KeyAction::ClearSelection);
    }

    let mut chars = key.chars();
    let (Some(c), None) = (chars.next(), chars.next()) else {
        return None;
    };
    let c = c.to_ascii_lowercase();

    if let Some(mode) = EffectMode::from_key(c) {
        return Some(KeyAction::SelectMode(mode));
    }
    LANDMARK_KEYS
        .contains(&c)
        .then_some(KeyAction::FlyToLandmark(c))
}

// ============================================================================
// Landmarks
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Landmark {
    pub key: char,
    pub name: &'static str,
    pub lat: f64,
    pub lon: f64,
    pub altitude_m: f64,
    pub heading_deg: f64,
    pub pitch_deg: f64,
}

impl Landmark {
    pub fn flight(&self, duration: Duration) -> CameraFlight {
        CameraFlight {
            lat: self.lat,
            lon: self.lon,
            altitude_m: self.altitude_m,
            heading_deg: self.heading_deg,
            pitch_deg: self.pitch_deg,
            duration,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct City {
    pub id: &'static str,
    pub name: &'static str,
    pub landmarks: [Landmark; 5],
}

impl City {
    pub fn landmark(&self, key: char) -> Option<&Landmark> {
        self.landmarks.iter().find(|l| l.key == key)
    }

    /// Landmark a city change flies to.
    pub fn home(&self) -> &Landmark {
        &self.landmarks[0]
    }
}

const fn lm(key: char, name: &'static str, lat: f64, lon: f64, altitude_m: f64, heading_deg: f64, pitch_deg: f64) -> Landmark {
    Landmark {
        key,
        name,
        lat,
        lon,
        altitude_m,
        heading_deg,
        pitch_deg,
    }
}

pub static CITIES: [City; 6] = [
    City {
        id: "earth",
        name: "Earth",
        landmarks: [
            lm('q', "Global overview", 20.0, 0.0, 22_000_000.0, 0.0, -90.0),
            lm('w', "Americas", 15.0, -80.0, 12_000_000.0, 0.0, -90.0),
            lm('e', "Europe & Africa", 20.0, 15.0, 12_000_000.0, 0.0, -90.0),
            lm('r', "Asia", 30.0, 100.0, 12_000_000.0, 0.0, -90.0),
            lm('t', "Pacific", 0.0, -160.0, 14_000_000.0, 0.0, -90.0),
        ],
    },
    City {
        id: "new-york",
        name: "New York",
        landmarks: [
            lm('q', "Midtown Manhattan", 40.7549, -73.9840, 2_500.0, 200.0, -35.0),
            lm('w', "Statue of Liberty", 40.6892, -74.0445, 1_200.0, 45.0, -25.0),
            lm('e', "Central Park", 40.7812, -73.9665, 3_000.0, 200.0, -45.0),
            lm('r', "Brooklyn Bridge", 40.7061, -73.9969, 1_000.0, 230.0, -25.0),
            lm('t', "JFK Airport", 40.6413, -73.7781, 4_000.0, 0.0, -50.0),
        ],
    },
    City {
        id: "london",
        name: "London",
        landmarks: [
            lm('q', "Westminster", 51.4995, -0.1248, 1_500.0, 90.0, -30.0),
            lm('w', "Tower Bridge", 51.5055, -0.0754, 1_000.0, 270.0, -25.0),
            lm('e', "The City", 51.5138, -0.0984, 2_500.0, 120.0, -40.0),
            lm('r', "Canary Wharf", 51.5054, -0.0235, 2_000.0, 250.0, -35.0),
            lm('t', "Heathrow", 51.4700, -0.4543, 5_000.0, 90.0, -50.0),
        ],
    },
    City {
        id: "tokyo",
        name: "Tokyo",
        landmarks: [
            lm('q', "Shibuya Crossing", 35.6595, 139.7005, 1_200.0, 30.0, -35.0),
            lm('w', "Tokyo Tower", 35.6586, 139.7454, 1_500.0, 330.0, -25.0),
            lm('e', "Shinjuku", 35.6938, 139.7034, 2_500.0, 90.0, -40.0),
            lm('r', "Imperial Palace", 35.6852, 139.7528, 2_000.0, 0.0, -50.0),
            lm('t', "Haneda Airport", 35.5494, 139.7798, 5_000.0, 300.0, -45.0),
        ],
    },
    City {
        id: "dubai",
        name: "Dubai",
        landmarks: [
            lm('q', "Burj Khalifa", 25.1972, 55.2744, 2_000.0, 300.0, -25.0),
            lm('w', "Palm Jumeirah", 25.1124, 55.1390, 8_000.0, 0.0, -60.0),
            lm('e', "Dubai Marina", 25.0805, 55.1403, 2_000.0, 220.0, -30.0),
            lm('r', "Dubai International", 25.2532, 55.3657, 5_000.0, 120.0, -45.0),
            lm('t', "Jebel Ali Port", 25.0112, 55.0611, 6_000.0, 200.0, -50.0),
        ],
    },
    City {
        id: "paris",
        name: "Paris",
        landmarks: [
            lm('q', "Eiffel Tower", 48.8584, 2.2945, 1_200.0, 120.0, -25.0),
            lm('w', "Louvre", 48.8606, 2.3376, 1_500.0, 270.0, -35.0),
            lm('e', "Arc de Triomphe", 48.8738, 2.2950, 1_200.0, 130.0, -30.0),
            lm('r', "Notre-Dame", 48.8530, 2.3499, 1_000.0, 90.0, -30.0),
            lm('t', "Charles de Gaulle", 49.0097, 2.5479, 5_000.0, 260.0, -45.0),
        ],
    },
];

pub fn find_city(id: &str) -> Option<&'static City> {
    CITIES.iter().find(|c| c.id.eq_ignore_ascii_case(id))
}

pub fn default_city() -> &'static City {
    &CITIES[0]
}

// ============================================================================
// Geocoder
// ============================================================================

/// A place resolved by the external geocoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodeResult {
    #[serde(default)]
    pub name: Option<String>,
    pub lat: f64,
    pub lon: f64,
    /// `[min_lat, max_lat, min_lon, max_lon]`
    #[serde(default)]
    pub bounding_box: Option<[f64; 4]>,
}

/// Altitude that frames the bounding box with some padding.
pub fn altitude_for_bbox(bbox: Option<[f64; 4]>) -> f64 {
    let Some([min_lat, max_lat, min_lon, max_lon]) = bbox else {
        return GEOCODE_DEFAULT_ALTITUDE_M;
    };
    let span = (max_lat - min_lat).abs().max((max_lon - min_lon).abs());
    if !span.is_finite() {
        return GEOCODE_DEFAULT_ALTITUDE_M;
    }
    (span * METERS_PER_DEGREE * GEOCODE_PADDING).clamp(GEOCODE_MIN_ALTITUDE_M, GEOCODE_MAX_ALTITUDE_M)
}

/// Look nearly straight down from high up, tilt toward the horizon when low.
pub fn pitch_for_altitude(altitude_m: f64) -> f64 {
    let tilt_deg = if altitude_m > 2_000_000.0 {
        2.0
    } else if altitude_m > 300_000.0 {
        8.0
    } else if altitude_m > 30_000.0 {
        20.0
    } else if altitude_m > 3_000.0 {
        30.0
    } else {
        45.0
    };
    -(90.0 - tilt_deg)
}

pub fn geocode_flight(result: &GeocodeResult) -> CameraFlight {
    let altitude_m = altitude_for_bbox(result.bounding_box);
    CameraFlight {
        lat: result.lat,
        lon: result.lon,
        altitude_m,
        heading_deg: 0.0,
        pitch_deg: pitch_for_altitude(altitude_m),
        duration: GEOCODE_FLIGHT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_bindings() {
        assert_eq!(key_action("1"), Some(KeyAction::SelectMode(EffectMode::Normal)));
        assert_eq!(key_action("3"), Some(KeyAction::SelectMode(EffectMode::NightVision)));
        assert_eq!(key_action("5"), Some(KeyAction::SelectMode(EffectMode::Flare)));
        assert_eq!(key_action("Q"), Some(KeyAction::FlyToLandmark('q')));
        assert_eq!(key_action("t"), Some(KeyAction::FlyToLandmark('t')));
        assert_eq!(key_action("Escape"), Some(KeyAction::ClearSelection));
        assert_eq!(key_action("y"), None);
        assert_eq!(key_action("6"), None);
        assert_eq!(key_action("qq"), None);
        assert_eq!(key_action(""), None);
    }

    #[test]
    fn test_every_city_binds_all_landmark_keys() {
        for city in CITIES.iter() {
            for key in LANDMARK_KEYS {
                assert!(city.landmark(key).is_some(), "{} missing {}", city.id, key);
            }
            assert_eq!(city.home().key, 'q');
        }
        assert_eq!(find_city("London").unwrap().name, "London");
        assert!(find_city("atlantis").is_none());
    }

    #[test]
    fn test_landmark_flight() {
        let city = find_city("paris").unwrap();
        let flight = city.landmark('q').unwrap().flight(LANDMARK_FLIGHT);
        assert_eq!(flight.altitude_m, 1_200.0);
        assert_eq!(flight.duration, Duration::from_millis(2500));
    }

    #[test]
    fn test_geocode_altitude() {
        let nyc = [40.4774, 40.9176, -74.2591, -73.7004];
        let altitude = altitude_for_bbox(Some(nyc));
        assert!((altitude - 0.5587 * 111_000.0 * 2.0).abs() < 1.0);
        assert_eq!(pitch_for_altitude(altitude), -70.0);

        assert_eq!(altitude_for_bbox(Some([1.0, 1.0, 2.0, 2.0])), 500.0);
        assert_eq!(altitude_for_bbox(Some([-80.0, 80.0, -180.0, 180.0])), 18_000_000.0);
        assert_eq!(altitude_for_bbox(None), 200_000.0);
    }

    #[test]
    fn test_pitch_flattens_with_altitude() {
        assert_eq!(pitch_for_altitude(10_000_000.0), -88.0);
        assert_eq!(pitch_for_altitude(500_000.0), -82.0);
        assert_eq!(pitch_for_altitude(10_000.0), -60.0);
        assert_eq!(pitch_for_altitude(1_000.0), -45.0);
    }

    #[test]
    fn test_geocode_result_wire_format() {
        let json = r#"{ "name": "Lisbon", "lat": 38.72, "lon": -9.14, "boundingBox": [38.69, 38.80, -9.23, -9.09] }"#;
        let result: GeocodeResult = serde_json::from_str(json).unwrap();
        let flight = geocode_flight(&result);
        assert_eq!(flight.duration, GEOCODE_FLIGHT);
        assert_eq!(flight.lat, 38.72);
        assert!(flight.altitude_m > 20_000.0);
    }
}
