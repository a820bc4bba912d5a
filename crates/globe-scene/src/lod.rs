//! Camera LOD Controller
//!
//! Altitude is sampled every frame but only published on the poll cadence,
//! and only once it has moved past the hysteresis band. Consumers never see
//! frame-to-frame jitter.
//!
//! The camera layer is gated separately on the raw sample taken at each poll,
//! so its visibility ceiling and icon steps never lag behind the band.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const POLL_INTERVAL: Duration = Duration::from_millis(1500);
pub const HYSTERESIS_M: f64 = 5_000.0;
/// Start-up overview altitude
pub const INITIAL_ALTITUDE_M: f64 = 20_000_000.0;
/// Camera markers are hidden at or above this altitude
pub const CAMERA_MARKER_CEILING_M: f64 = 15_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AltitudeTier {
    Street,
    District,
    City,
    Regional,
    Continental,
    Orbit,
}

impl AltitudeTier {
    pub fn from_altitude(altitude_m: f64) -> Self {
        if altitude_m > 8_000_000.0 {
            Self::Orbit
        } else if altitude_m > 2_000_000.0 {
            Self::Continental
        } else if altitude_m > 300_000.0 {
            Self::Regional
        } else if altitude_m > 30_000.0 {
            Self::City
        } else if altitude_m > 3_000.0 {
            Self::District
        } else {
            Self::Street
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LodReading {
    pub altitude_m: f64,
    pub tier: AltitudeTier,
}

impl LodReading {
    pub fn at(altitude_m: f64) -> Self {
        Self {
            altitude_m,
            tier: AltitudeTier::from_altitude(altitude_m),
        }
    }

    pub fn cameras_visible(&self) -> bool {
        self.altitude_m < CAMERA_MARKER_CEILING_M
    }

    pub fn camera_icon_px(&self) -> f32 {
        if self.altitude_m < 5_000.0 {
            22.0
        } else if self.altitude_m < 50_000.0 {
            18.0
        } else {
            14.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct CameraLodController {
    sampled_m: f64,
    published: LodReading,
    camera_gate: LodReading,
}

impl Default for CameraLodController {
    fn default() -> Self {
        Self::new(INITIAL_ALTITUDE_M)
    }
}

impl CameraLodController {
    pub fn new(initial_altitude_m: f64) -> Self {
        Self {
            sampled_m: initial_altitude_m,
            published: LodReading::at(initial_altitude_m),
            camera_gate: LodReading::at(initial_altitude_m),
        }
    }

    /// Per-frame sample. Non-finite readings are ignored.
    pub fn sample(&mut self, altitude_m: f64) {
        if altitude_m.is_finite() {
            self.sampled_m = altitude_m;
        }
    }

    /// Publish the latest sample if it left the hysteresis band.
    pub fn poll(&mut self) -> Option<LodReading> {
        if (self.sampled_m - self.published.altitude_m).abs() <= HYSTERESIS_M {
            return None;
        }

        let previous = self.published.tier;
        self.published = LodReading::at(self.sampled_m);
        if self.published.tier != previous {
            tracing::debug!(
                altitude_m = self.published.altitude_m,
                tier = ?self.published.tier,
                "altitude tier changed"
            );
        }
        Some(self.published)
    }

    /// Re-gate the camera layer on the latest raw sample. Returns the new
    /// reading when marker visibility or icon size changed.
    pub fn poll_camera_gate(&mut self) -> Option<LodReading> {
        let raw = LodReading::at(self.sampled_m);
        let gate = self.camera_gate;
        if raw.cameras_visible() == gate.cameras_visible() && raw.camera_icon_px() == gate.camera_icon_px() {
            return None;
        }

        tracing::debug!(
            altitude_m = raw.altitude_m,
            visible = raw.cameras_visible(),
            icon_px = raw.camera_icon_px(),
            "camera gate changed"
        );
        self.camera_gate = raw;
        Some(raw)
    }

    pub fn reading(&self) -> LodReading {
        self.published
    }

    pub fn camera_reading(&self) -> LodReading {
        self.camera_gate
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
