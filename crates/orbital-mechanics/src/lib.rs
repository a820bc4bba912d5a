//! Orbital Mechanics Library
//!
//! SGP4 propagation of two-line element sets, Greenwich sidereal time, and
//! TEME to geodetic transforms for the globe view. Propagation never errors
//! at the call site: an instant the model cannot resolve yields `None` and the
//! caller skips that record for the tick.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrbitalError {
    #[error("Invalid TLE format for {name}: {reason}")]
    InvalidTle { name: String, reason: String },
    #[error("Element set rejected by SGP4 for {name}: {reason}")]
    InvalidElements { name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, OrbitalError>;

/// Raw element record as delivered by the element catalog feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrbitalElementRecord {
    pub name: String,
    pub line1: String,
    pub line2: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeodeticPosition {
    /// Degrees, [-90, 90]
    pub latitude: f64,
    /// Degrees, [-180, 180]
    pub longitude: f64,
    pub altitude_m: f64,
}

/// Propagation-ready element set, built once per record at ingestion.
pub struct ElementSet {
    name: String,
    elements: sgp4::Elements,
    constants: sgp4::Constants,
}

impl fmt::Debug for ElementSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementSet")
            .field("name", &self.name)
            .field("norad_id", &self.elements.norad_id)
            .field("epoch", &self.elements.datetime)
            .finish()
    }
}

impl ElementSet {
    pub fn from_record(record: &OrbitalElementRecord) -> Result<Self> {
        let name = record.name.trim().to_string();

        let elements = sgp4::Elements::from_tle(
            Some(name.clone()),
            record.line1.trim_end().as_bytes(),
            record.line2.trim_end().as_bytes(),
        )
        .map_err(|e| OrbitalError::InvalidTle {
            name: name.clone(),
            reason: format!("{:?}", e),
        })?;

        let constants = sgp4::Constants::from_elements(&elements).map_err(|e| {
            OrbitalError::InvalidElements {
                name: name.clone(),
                reason: format!("{:?}", e),
            }
        })?;

        Ok(Self {
            name,
            elements,
            constants,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn norad_id(&self) -> u64 {
        self.elements.norad_id
    }

    pub fn epoch(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_naive_utc_and_offset(self.elements.datetime, Utc)
    }

    /// Period of one revolution derived from the mean motion (rev/day).
    pub fn orbital_period_minutes(&self) -> Option<f64> {
        (self.elements.mean_motion > 0.0).then(|| 1440.0 / self.elements.mean_motion)
    }

    /// Geodetic sub-point and altitude at `time`, or `None` when the model
    /// reports a decayed or otherwise invalid orbit for that instant.
    pub fn position_at(&self, time: DateTime<Utc>) -> Option<GeodeticPosition> {
        let teme = propagation::teme_position_km(self, time)?;
        transforms::teme_to_geodetic(teme, sidereal::gmst(time))
    }
}

pub mod propagation {
    use super::*;

    pub fn minutes_since_epoch(set: &ElementSet, time: DateTime<Utc>) -> f64 {
        let duration = time.signed_duration_since(set.epoch());
        duration.num_milliseconds() as f64 / 60_000.0
    }

    /// Raw SGP4 position in the TEME frame, kilometers.
    pub fn teme_position_km(set: &ElementSet, time: DateTime<Utc>) -> Option<[f64; 3]> {
        let t = minutes_since_epoch(set, time);

        match set.constants.propagate(t) {
            Ok(prediction) => {
                let p = prediction.position;
                if p.iter().all(|c| c.is_finite()) {
                    Some(p)
                } else {
                    tracing::debug!(satellite = %set.name, "SGP4 returned non-finite position");
                    None
                }
            }
            Err(e) => {
                tracing::debug!(satellite = %set.name, minutes = t, "SGP4 propagation failed: {:?}", e);
                None
            }
        }
    }

    /// Sample the sub-satellite path at `steps` offsets of `step` from `start`.
    /// Instants that fail to propagate are skipped.
    pub fn ground_track(
        set: &ElementSet,
        start: DateTime<Utc>,
        steps: u32,
        step: Duration,
    ) -> Vec<GeodeticPosition> {
        (0..steps)
            .filter_map(|i| set.position_at(start + step * i as i32))
            .collect()
    }
}

pub mod sidereal {
    use super::*;
    use std::f64::consts::TAU;

    const JD_UNIX_EPOCH: f64 = 2_440_587.5;
    const JD_J2000: f64 = 2_451_545.0;

    pub fn julian_date(time: DateTime<Utc>) -> f64 {
        time.timestamp_millis() as f64 / 86_400_000.0 + JD_UNIX_EPOCH
    }

    /// Greenwich mean sidereal time (IAU-82), radians in [0, 2π).
    pub fn gmst(time: DateTime<Utc>) -> f64 {
        let tut1 = (julian_date(time) - JD_J2000) / 36_525.0;
        let seconds = -6.2e-6 * tut1.powi(3)
            + 0.093_104 * tut1.powi(2)
            + (876_600.0 * 3600.0 + 8_640_184.812_866) * tut1
            + 67_310.548_41;

        (seconds.to_radians() / 240.0).rem_euclid(TAU)
    }
}

pub mod transforms {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI, TAU};

    const EARTH_RADIUS_KM: f64 = 6378.137;
    const EARTH_FLATTENING: f64 = 1.0 / 298.257223563;
    const MAX_ITERATIONS: usize = 20;

    /// Rotate a TEME vector into the Earth-fixed frame and solve for WGS-84
    /// geodetic coordinates.
    pub fn teme_to_geodetic(teme_km: [f64; 3], gmst: f64) -> Option<GeodeticPosition> {
        let [x, y, z] = teme_km;
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            return None;
        }

        let r = (x * x + y * y).sqrt();
        let e2 = EARTH_FLATTENING * (2.0 - EARTH_FLATTENING);

        let longitude = normalize_longitude(y.atan2(x) - gmst);

        let mut latitude = z.atan2(r);
        let mut c = 1.0;
        for _ in 0..MAX_ITERATIONS {
            let previous = latitude;
            c = 1.0 / (1.0 - e2 * latitude.sin().powi(2)).sqrt();
            latitude = (z + EARTH_RADIUS_KM * c * e2 * latitude.sin()).atan2(r);
            if (latitude - previous).abs() < 1e-12 {
                break;
            }
        }

        let altitude_km = if latitude.abs() < FRAC_PI_2 - 1e-6 {
            r / latitude.cos() - EARTH_RADIUS_KM * c
        } else {
            z.abs() - EARTH_RADIUS_KM * (1.0 - EARTH_FLATTENING)
        };

        if !altitude_km.is_finite() {
            return None;
        }

        Some(GeodeticPosition {
            latitude: latitude.to_degrees().clamp(-90.0, 90.0),
            longitude: longitude.to_degrees().clamp(-180.0, 180.0),
            altitude_m: altitude_km * 1000.0,
        })
    }

    /// Wrap radians into [-π, π).
    pub fn normalize_longitude(lon: f64) -> f64 {
        (lon + PI).rem_euclid(TAU) - PI
    }
}

pub use propagation::ground_track;
pub use sidereal::gmst;
