//! Layer Render-Batch Manager
//!
//! One renderer batch per data layer. A refresh never patches a batch: the
//! batch is cleared and rebuilt from the current record set, so a record that
//! disappears upstream can never leave a stale marker behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use orbital_mechanics::{ElementSet, OrbitalElementRecord};
use track_feeds::{CameraMarker, EarthquakeFeature, FeedKind, FeedPayload, FlightState};

use crate::entity::{EntityKind, MarkerPayload, TrackedEntity};
use crate::lod::LodReading;
use crate::renderer::{BatchHandle, Color, Icon, Marker, MarkerStyle, Renderer};
use crate::{Result, SceneError};

pub const SPARSE_LIMIT: usize = 300;

const SATELLITE_ICON_PX: f32 = 10.0;
const FLIGHT_ICON_PX: f32 = 10.0;
const MILITARY_ICON_PX: f32 = 12.0;
const TRACKED_ICON_PX: f32 = 18.0;

const SATELLITE_COLOR: Color = Color::rgb(0x00, 0xff, 0x41).with_alpha(0.8);
const FLIGHT_COLOR: Color = Color::rgb(0x00, 0xcf, 0xff).with_alpha(0.85);
const MILITARY_COLOR: Color = Color::rgb(0xff, 0x88, 0x00).with_alpha(0.9);
const CAMERA_COLOR: Color = Color::rgb(0xff, 0x33, 0x66);
const FOOTPRINT_ALPHA: f32 = 0.45;

const CIVIL_MIN_ALTITUDE_M: f64 = 100.0;
const MILITARY_MIN_ALTITUDE_M: f64 = 500.0;
const CAMERA_MARKER_ALTITUDE_M: f64 = 5.0;

// ============================================================================
// Layer identity, visibility, density
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerId {
    Satellites,
    Flights,
    Military,
    Earthquakes,
    Cameras,
}

impl LayerId {
    pub const ALL: [LayerId; 5] = [
        Self::Satellites,
        Self::Flights,
        Self::Military,
        Self::Earthquakes,
        Self::Cameras,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Satellites => "satellites",
            Self::Flights => "flights",
            Self::Military => "military",
            Self::Earthquakes => "earthquakes",
            Self::Cameras => "cameras",
        }
    }

    pub fn for_feed(kind: FeedKind) -> Self {
        match kind {
            FeedKind::OrbitalElements => Self::Satellites,
            FeedKind::Flights => Self::Flights,
            FeedKind::MilitaryFlights => Self::Military,
            FeedKind::Earthquakes => Self::Earthquakes,
            FeedKind::Cameras => Self::Cameras,
        }
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayerId {
    type Err = SceneError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "satellites" => Ok(Self::Satellites),
            "flights" => Ok(Self::Flights),
            "military" => Ok(Self::Military),
            "earthquakes" => Ok(Self::Earthquakes),
            "cameras" | "cctv" => Ok(Self::Cameras),
            _ => Err(SceneError::UnknownLayer(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerVisibility {
    pub satellites: bool,
    pub flights: bool,
    pub military: bool,
    pub earthquakes: bool,
    pub cameras: bool,
}

impl Default for LayerVisibility {
    fn default() -> Self {
        Self {
            satellites: true,
            flights: true,
            military: true,
            earthquakes: true,
            cameras: true,
        }
    }
}

impl LayerVisibility {
    pub fn get(&self, layer: LayerId) -> bool {
        match layer {
            LayerId::Satellites => self.satellites,
            LayerId::Flights => self.flights,
            LayerId::Military => self.military,
            LayerId::Earthquakes => self.earthquakes,
            LayerId::Cameras => self.cameras,
        }
    }

    /// Returns `true` when the flag actually changed.
    pub fn set(&mut self, layer: LayerId, visible: bool) -> bool {
        let flag = match layer {
            LayerId::Satellites => &mut self.satellites,
            LayerId::Flights => &mut self.flights,
            LayerId::Military => &mut self.military,
            LayerId::Earthquakes => &mut self.earthquakes,
            LayerId::Cameras => &mut self.cameras,
        };
        std::mem::replace(flag, visible) != visible
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DensityMode {
    #[default]
    Sparse,
    Full,
}

impl FromStr for DensityMode {
    type Err = SceneError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sparse" => Ok(Self::Sparse),
            "full" => Ok(Self::Full),
            _ => Err(SceneError::UnknownDensity(s.to_string())),
        }
    }
}

/// Fixed-stride subsample: keeps records whose index is a multiple of
/// `ceil(total / limit)`. Deterministic and never longer than `limit`.
pub fn sparse_sample<T>(records: &[T], limit: usize) -> impl Iterator<Item = &T> {
    let stride = records.len().div_ceil(limit.max(1)).max(1);
    records.iter().step_by(stride)
}

// ============================================================================
// Scene data
// ============================================================================

/// Current record set per layer. Each feed update replaces its slot wholesale.
#[derive(Debug, Default)]
pub struct SceneData {
    pub satellites: Vec<ElementSet>,
    pub flights: Vec<FlightState>,
    pub military: Vec<FlightState>,
    pub earthquakes: Vec<EarthquakeFeature>,
    pub cameras: Vec<CameraMarker>,
}

impl SceneData {
    /// Replace the slot for this payload's feed. Returns the affected layer.
    pub fn apply(&mut self, payload: FeedPayload) -> LayerId {
        let layer = LayerId::for_feed(payload.kind());
        match payload {
            FeedPayload::OrbitalElements(records) => self.satellites = parse_catalog(&records),
            FeedPayload::Flights(flights) => self.flights = flights,
            FeedPayload::MilitaryFlights(flights) => self.military = flights,
            FeedPayload::Earthquakes(quakes) => self.earthquakes = quakes,
            FeedPayload::Cameras(cameras) => self.cameras = cameras,
        }
        layer
    }

    pub fn record_count(&self, layer: LayerId) -> usize {
        match layer {
            LayerId::Satellites => self.satellites.len(),
            LayerId::Flights => self.flights.len(),
            LayerId::Military => self.military.len(),
            LayerId::Earthquakes => self.earthquakes.len(),
            LayerId::Cameras => self.cameras.len(),
        }
    }

    pub fn satellite(&self, name: &str) -> Option<&ElementSet> {
        self.satellites.iter().find(|s| s.name() == name)
    }

    /// Element set behind a tracked satellite, matched on name and NORAD id.
    pub fn tracked_satellite(&self, tracked: &TrackedEntity) -> Option<&ElementSet> {
        self.satellites.iter().find(|set| is_tracked_satellite(tracked, set))
    }

    pub fn camera(&self, id: &str) -> Option<&CameraMarker> {
        self.cameras.iter().find(|c| c.id == id)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

fn is_tracked_satellite(tracked: &TrackedEntity, set: &ElementSet) -> bool {
    tracked.kind == EntityKind::Satellite
        && tracked.id == set.name()
        && tracked.norad_id().map_or(true, |id| id == set.norad_id())
}

/// Parse element records, dropping the ones SGP4 cannot initialise.
pub fn parse_catalog(records: &[OrbitalElementRecord]) -> Vec<ElementSet> {
    let catalog: Vec<ElementSet> = records
        .iter()
        .filter_map(|record| match ElementSet::from_record(record) {
            Ok(set) => Some(set),
            Err(e) => {
                debug!("dropping element record: {}", e);
                None
            }
        })
        .collect();

    let dropped = records.len() - catalog.len();
    if dropped > 0 {
        info!(parsed = catalog.len(), dropped, "element catalog ingested with malformed records");
    }
    catalog
}

// ============================================================================
// Batch manager
// ============================================================================

/// Inputs that shape a rebuild besides the records themselves.
#[derive(Debug, Clone, Copy)]
pub struct RefreshContext<'a> {
    pub visibility: &'a LayerVisibility,
    pub density: DensityMode,
    pub tracked: Option<&'a TrackedEntity>,
    pub lod: LodReading,
    pub now: DateTime<Utc>,
}

impl RefreshContext<'_> {
    fn layer_visible(&self, layer: LayerId) -> bool {
        self.visibility.get(layer) && (layer != LayerId::Cameras || self.lod.cameras_visible())
    }

    fn tracked_id(&self, kind: EntityKind) -> Option<&str> {
        self.tracked
            .filter(|t| t.kind == kind)
            .map(|t| t.id.as_str())
    }
}

#[derive(Debug, Default)]
pub struct LayerBatchManager {
    batches: BTreeMap<LayerId, BatchHandle>,
    rendered: BTreeMap<LayerId, usize>,
}

impl LayerBatchManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_mounted(&self) -> bool {
        !self.batches.is_empty()
    }

    /// Create any missing batches. Safe to call on an already mounted manager.
    pub fn mount<R: Renderer>(&mut self, renderer: &mut R) -> Result<()> {
        for layer in LayerId::ALL {
            if self.batches.contains_key(&layer) {
                continue;
            }
            let batch = renderer.create_batch(layer.as_str())?;
            self.batches.insert(layer, batch);
        }
        Ok(())
    }

    /// Destroy every batch exactly once. A second call finds nothing to do.
    pub fn teardown<R: Renderer>(&mut self, renderer: &mut R) {
        for (layer, batch) in std::mem::take(&mut self.batches) {
            if let Err(e) = renderer.destroy_batch(batch) {
                warn!(layer = %layer, "failed to destroy batch: {}", e);
            }
        }
        self.rendered.clear();
    }

    pub fn rendered_count(&self, layer: LayerId) -> usize {
        self.rendered.get(&layer).copied().unwrap_or(0)
    }

    /// Rebuild one layer. Returns fresh attributes for the tracked entity when
    /// it belongs to this layer and is still present in the record set.
    pub fn refresh<R: Renderer>(
        &mut self,
        renderer: &mut R,
        layer: LayerId,
        data: &SceneData,
        ctx: &RefreshContext<'_>,
    ) -> Result<Option<TrackedEntity>> {
        let batch = *self.batches.get(&layer).ok_or(SceneError::NotMounted)?;
        let tracked = ctx
            .tracked
            .and_then(|t| tracked_attributes(layer, data, t, ctx.now));

        renderer.clear_batch(batch)?;

        if !ctx.layer_visible(layer) {
            renderer.set_batch_visible(batch, false)?;
            self.rendered.insert(layer, 0);
            return Ok(tracked);
        }

        let markers = build_markers(layer, data, ctx);
        let count = markers.len();
        renderer.populate_batch(batch, markers)?;
        renderer.set_batch_visible(batch, true)?;
        self.rendered.insert(layer, count);

        debug!(layer = %layer, markers = count, "layer rebuilt");
        Ok(tracked)
    }

    pub fn refresh_all<R: Renderer>(
        &mut self,
        renderer: &mut R,
        data: &SceneData,
        ctx: &RefreshContext<'_>,
    ) -> Result<Option<TrackedEntity>> {
        let mut tracked = None;
        for layer in LayerId::ALL {
            if let Some(entity) = self.refresh(renderer, layer, data, ctx)? {
                tracked = Some(entity);
            }
        }
        Ok(tracked)
    }
}

fn tracked_attributes(
    layer: LayerId,
    data: &SceneData,
    tracked: &TrackedEntity,
    now: DateTime<Utc>,
) -> Option<TrackedEntity> {
    let id = tracked.id.as_str();
    let payload = match (layer, tracked.kind) {
        (LayerId::Satellites, EntityKind::Satellite) => {
            let set = data.tracked_satellite(tracked)?;
            MarkerPayload::satellite(set.name(), set.norad_id(), set.position_at(now)?)
        }
        (LayerId::Flights, EntityKind::Flight) => {
            let flight = data.flights.iter().find(|f| f.icao24 == id)?;
            MarkerPayload::flight(flight, false)?
        }
        (LayerId::Military, EntityKind::Flight) => {
            let flight = data.military.iter().find(|f| f.icao24 == id)?;
            MarkerPayload::flight(flight, true)?
        }
        (LayerId::Earthquakes, EntityKind::Earthquake) => {
            MarkerPayload::earthquake(data.earthquakes.iter().find(|q| q.id == id)?)
        }
        _ => return None,
    };
    payload.to_tracked()
}

fn build_markers(layer: LayerId, data: &SceneData, ctx: &RefreshContext<'_>) -> Vec<Marker> {
    match layer {
        LayerId::Satellites => satellite_markers(&data.satellites, ctx),
        LayerId::Flights => flight_markers(&data.flights, false, ctx),
        LayerId::Military => flight_markers(&data.military, true, ctx),
        LayerId::Earthquakes => earthquake_markers(&data.earthquakes, ctx),
        LayerId::Cameras => camera_markers(&data.cameras, ctx),
    }
}

fn billboard(icon: Icon, size_px: f32, color: Color, rotation_deg: f64) -> MarkerStyle {
    MarkerStyle::Billboard {
        icon,
        size_px,
        color,
        rotation_deg,
    }
}

fn satellite_markers(catalog: &[ElementSet], ctx: &RefreshContext<'_>) -> Vec<Marker> {
    let sample: Vec<&ElementSet> = match ctx.density {
        DensityMode::Sparse => sparse_sample(catalog, SPARSE_LIMIT).collect(),
        DensityMode::Full => catalog.iter().collect(),
    };

    sample
        .into_iter()
        .filter_map(|set| {
            let position = set.position_at(ctx.now)?;
            let highlighted = ctx.tracked.is_some_and(|t| is_tracked_satellite(t, set));
            let style = if highlighted {
                billboard(Icon::Satellite, TRACKED_ICON_PX, Color::WHITE, 0.0)
            } else {
                billboard(Icon::Satellite, SATELLITE_ICON_PX, SATELLITE_COLOR, 0.0)
            };
            Some(Marker {
                lat: position.latitude,
                lon: position.longitude,
                altitude_m: position.altitude_m,
                style,
                highlighted,
                payload: MarkerPayload::satellite(set.name(), set.norad_id(), position),
            })
        })
        .collect()
}

fn flight_markers(flights: &[FlightState], military: bool, ctx: &RefreshContext<'_>) -> Vec<Marker> {
    let tracked = ctx.tracked_id(EntityKind::Flight);
    let (icon, size_px, color, floor_m) = if military {
        (Icon::MilitaryAircraft, MILITARY_ICON_PX, MILITARY_COLOR, MILITARY_MIN_ALTITUDE_M)
    } else {
        (Icon::Aircraft, FLIGHT_ICON_PX, FLIGHT_COLOR, CIVIL_MIN_ALTITUDE_M)
    };

    flights
        .iter()
        .filter(|f| f.is_renderable())
        .filter_map(|flight| {
            let payload = MarkerPayload::flight(flight, military)?;
            let highlighted = tracked == Some(flight.icao24.as_str());
            let style = if highlighted {
                billboard(icon, TRACKED_ICON_PX, Color::WHITE, flight.heading_deg)
            } else {
                billboard(icon, size_px, color, flight.heading_deg)
            };
            let (lat, lon) = flight.position()?;
            Some(Marker {
                lat,
                lon,
                altitude_m: flight.altitude_m.max(floor_m),
                style,
                highlighted,
                payload,
            })
        })
        .collect()
}

fn earthquake_markers(quakes: &[EarthquakeFeature], ctx: &RefreshContext<'_>) -> Vec<Marker> {
    let tracked = ctx.tracked_id(EntityKind::Earthquake);

    quakes
        .iter()
        .map(|quake| {
            let highlighted = tracked == Some(quake.id.as_str());
            let color = if highlighted {
                Color::WHITE
            } else {
                Color::from_hex(quake.severity().color_hex()).unwrap_or(Color::WHITE)
            };
            Marker {
                lat: quake.lat,
                lon: quake.lon,
                altitude_m: 0.0,
                style: MarkerStyle::Footprint {
                    radius_m: quake.footprint_radius_m(),
                    color: color.with_alpha(FOOTPRINT_ALPHA),
                },
                highlighted,
                payload: MarkerPayload::earthquake(quake),
            }
        })
        .collect()
}

fn camera_markers(cameras: &[CameraMarker], ctx: &RefreshContext<'_>) -> Vec<Marker> {
    let size_px = ctx.lod.camera_icon_px();

    cameras
        .iter()
        .map(|camera| Marker {
            lat: camera.lat,
            lon: camera.lon,
            altitude_m: CAMERA_MARKER_ALTITUDE_M,
            style: billboard(Icon::Camera, size_px, CAMERA_COLOR, 0.0),
            highlighted: false,
            payload: MarkerPayload::Camera(camera.clone()),
        })
        .collect()
}
