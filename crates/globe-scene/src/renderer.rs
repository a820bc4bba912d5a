//! Renderer capability set
//!
//! The globe engine itself is external. Everything the scene needs from it
//! goes through [`Renderer`]: marker batches, polylines, post-processing
//! stages, camera flights, altitude sampling and screen-space picking.
//! [`HeadlessRenderer`] keeps all of it in memory for tests and for running
//! the gateway without a GPU host attached.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use thiserror::Error;

use crate::entity::MarkerPayload;
use orbital_mechanics::GeodeticPosition;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RendererError {
    #[error("Unknown batch handle {0}")]
    UnknownBatch(u64),
    #[error("Unknown polyline handle {0}")]
    UnknownPolyline(u64),
    #[error("Unknown stage handle {0}")]
    UnknownStage(u64),
    #[error("Stage {0} is already registered")]
    DuplicateStage(String),
    #[error("Engine refused to construct stage {0}")]
    StageUnavailable(String),
}

pub type RenderResult<T> = std::result::Result<T, RendererError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolylineHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StageHandle(pub u64);

// ============================================================================
// Drawables
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(0xff, 0xff, 0xff);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    /// Parse `#rrggbb`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#')?;
        if digits.len() != 6 {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok();
        Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Icon {
    Satellite,
    Aircraft,
    MilitaryAircraft,
    Camera,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum MarkerStyle {
    /// Screen-aligned icon, rotated clockwise by `rotation_deg`.
    Billboard {
        icon: Icon,
        size_px: f32,
        color: Color,
        rotation_deg: f64,
    },
    /// Ground ellipse of fixed radius.
    Footprint { radius_m: f64, color: Color },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub lat: f64,
    pub lon: f64,
    pub altitude_m: f64,
    pub style: MarkerStyle,
    /// Drawn as the currently tracked entity
    pub highlighted: bool,
    pub payload: MarkerPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Polyline {
    pub points: Vec<GeodeticPosition>,
    pub width: f32,
    pub glow: f32,
    pub color: Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StageSource {
    /// Fragment shader compiled by the engine
    Glsl(&'static str),
    /// Stage from the engine's own library
    Builtin(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageDescriptor {
    pub name: &'static str,
    pub source: StageSource,
    pub uniforms: Vec<(&'static str, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraFlight {
    pub lat: f64,
    pub lon: f64,
    pub altitude_m: f64,
    pub heading_deg: f64,
    pub pitch_deg: f64,
    pub duration: Duration,
}

// ============================================================================
// Capability trait
// ============================================================================

pub trait Renderer: Send {
    fn create_batch(&mut self, name: &str) -> RenderResult<BatchHandle>;
    fn set_batch_visible(&mut self, batch: BatchHandle, visible: bool) -> RenderResult<()>;
    fn clear_batch(&mut self, batch: BatchHandle) -> RenderResult<()>;
    fn populate_batch(&mut self, batch: BatchHandle, markers: Vec<Marker>) -> RenderResult<()>;
    fn destroy_batch(&mut self, batch: BatchHandle) -> RenderResult<()>;

    fn add_polyline(&mut self, polyline: Polyline) -> RenderResult<PolylineHandle>;
    fn remove_polyline(&mut self, polyline: PolylineHandle) -> RenderResult<()>;

    fn add_stage(&mut self, stage: &StageDescriptor) -> RenderResult<StageHandle>;
    fn remove_stage(&mut self, stage: StageHandle) -> RenderResult<()>;
    fn set_stage_enabled(&mut self, stage: StageHandle, enabled: bool) -> RenderResult<()>;
    fn set_uniform(&mut self, stage: StageHandle, name: &str, value: f64) -> RenderResult<()>;

    fn fly_to(&mut self, flight: CameraFlight);
    /// Camera height above the ellipsoid, meters. Cheap; sampled every frame.
    fn camera_altitude(&self) -> f64;
    /// Payload of the marker under the screen position, if any.
    fn pick(&self, x: f64, y: f64) -> Option<MarkerPayload>;
}

// ============================================================================
// Headless renderer
// ============================================================================

const PICK_RADIUS_DEG: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct HeadlessBatch {
    pub name: String,
    pub visible: bool,
    pub markers: Vec<Marker>,
}

#[derive(Debug, Clone)]
pub struct HeadlessStage {
    pub name: String,
    pub enabled: bool,
    pub uniforms: BTreeMap<String, f64>,
}

/// In-memory renderer. Screen coordinates for [`Renderer::pick`] are taken as
/// (longitude, latitude) degrees; camera flights complete instantly.
#[derive(Debug)]
pub struct HeadlessRenderer {
    next_handle: u64,
    batches: BTreeMap<u64, HeadlessBatch>,
    polylines: BTreeMap<u64, Polyline>,
    stages: BTreeMap<u64, HeadlessStage>,
    unavailable_stages: BTreeSet<String>,
    camera_altitude_m: f64,
    flights: Vec<CameraFlight>,
}

impl Default for HeadlessRenderer {
    fn default() -> Self {
        Self::new(crate::lod::INITIAL_ALTITUDE_M)
    }
}

impl HeadlessRenderer {
    pub fn new(camera_altitude_m: f64) -> Self {
        Self {
            next_handle: 1,
            batches: BTreeMap::new(),
            polylines: BTreeMap::new(),
            stages: BTreeMap::new(),
            unavailable_stages: BTreeSet::new(),
            camera_altitude_m,
            flights: Vec::new(),
        }
    }

    /// Make the engine refuse to construct the named stage.
    pub fn refuse_stage(&mut self, name: &str) {
        self.unavailable_stages.insert(name.to_string());
    }

    pub fn set_camera_altitude(&mut self, altitude_m: f64) {
        self.camera_altitude_m = altitude_m;
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    pub fn batch_by_name(&self, name: &str) -> Option<&HeadlessBatch> {
        self.batches.values().find(|b| b.name == name)
    }

    pub fn polyline_count(&self) -> usize {
        self.polylines.len()
    }

    pub fn polylines(&self) -> impl Iterator<Item = &Polyline> {
        self.polylines.values()
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn stage_by_name(&self, name: &str) -> Option<&HeadlessStage> {
        self.stages.values().find(|s| s.name == name)
    }

    pub fn enabled_stages(&self) -> Vec<&str> {
        self.stages
            .values()
            .filter(|s| s.enabled)
            .map(|s| s.name.as_str())
            .collect()
    }

    pub fn flights(&self) -> &[CameraFlight] {
        &self.flights
    }

    pub fn last_flight(&self) -> Option<&CameraFlight> {
        self.flights.last()
    }

    fn allocate(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn batch_mut(&mut self, batch: BatchHandle) -> RenderResult<&mut HeadlessBatch> {
        self.batches
            .get_mut(&batch.0)
            .ok_or(RendererError::UnknownBatch(batch.0))
    }

    fn stage_mut(&mut self, stage: StageHandle) -> RenderResult<&mut HeadlessStage> {
        self.stages
            .get_mut(&stage.0)
            .ok_or(RendererError::UnknownStage(stage.0))
    }
}

impl Renderer for HeadlessRenderer {
    fn create_batch(&mut self, name: &str) -> RenderResult<BatchHandle> {
        let handle = self.allocate();
        self.batches.insert(
            handle,
            HeadlessBatch {
                name: name.to_string(),
                visible: true,
                markers: Vec::new(),
            },
        );
        Ok(BatchHandle(handle))
    }

    fn set_batch_visible(&mut self, batch: BatchHandle, visible: bool) -> RenderResult<()> {
        self.batch_mut(batch)?.visible = visible;
        Ok(())
    }

    fn clear_batch(&mut self, batch: BatchHandle) -> RenderResult<()> {
        self.batch_mut(batch)?.markers.clear();
        Ok(())
    }

    fn populate_batch(&mut self, batch: BatchHandle, markers: Vec<Marker>) -> RenderResult<()> {
        self.batch_mut(batch)?.markers.extend(markers);
        Ok(())
    }

    fn destroy_batch(&mut self, batch: BatchHandle) -> RenderResult<()> {
        self.batches
            .remove(&batch.0)
            .map(|_| ())
            .ok_or(RendererError::UnknownBatch(batch.0))
    }

    fn add_polyline(&mut self, polyline: Polyline) -> RenderResult<PolylineHandle> {
        let handle = self.allocate();
        self.polylines.insert(handle, polyline);
        Ok(PolylineHandle(handle))
    }

    fn remove_polyline(&mut self, polyline: PolylineHandle) -> RenderResult<()> {
        self.polylines
            .remove(&polyline.0)
            .map(|_| ())
            .ok_or(RendererError::UnknownPolyline(polyline.0))
    }

    fn add_stage(&mut self, stage: &StageDescriptor) -> RenderResult<StageHandle> {
        if self.unavailable_stages.contains(stage.name) {
            return Err(RendererError::StageUnavailable(stage.name.to_string()));
        }
        if self.stage_by_name(stage.name).is_some() {
            return Err(RendererError::DuplicateStage(stage.name.to_string()));
        }

        let handle = self.allocate();
        self.stages.insert(
            handle,
            HeadlessStage {
                name: stage.name.to_string(),
                enabled: true,
                uniforms: stage
                    .uniforms
                    .iter()
                    .map(|(name, value)| (name.to_string(), *value))
                    .collect(),
            },
        );
        Ok(StageHandle(handle))
    }

    fn remove_stage(&mut self, stage: StageHandle) -> RenderResult<()> {
        self.stages
            .remove(&stage.0)
            .map(|_| ())
            .ok_or(RendererError::UnknownStage(stage.0))
    }

    fn set_stage_enabled(&mut self, stage: StageHandle, enabled: bool) -> RenderResult<()> {
        self.stage_mut(stage)?.enabled = enabled;
        Ok(())
    }

    fn set_uniform(&mut self, stage: StageHandle, name: &str, value: f64) -> RenderResult<()> {
        self.stage_mut(stage)?
            .uniforms
            .insert(name.to_string(), value);
        Ok(())
    }

    fn fly_to(&mut self, flight: CameraFlight) {
        self.camera_altitude_m = flight.altitude_m;
        self.flights.push(flight);
    }

    fn camera_altitude(&self) -> f64 {
        self.camera_altitude_m
    }

    fn pick(&self, x: f64, y: f64) -> Option<MarkerPayload> {
        self.batches
            .values()
            .filter(|b| b.visible)
            .flat_map(|b| b.markers.iter())
            .map(|m| (m, (m.lon - x).hypot(m.lat - y)))
            .filter(|(_, distance)| *distance <= PICK_RADIUS_DEG)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(m, _)| m.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_marker(id: &str, lat: f64, lon: f64) -> Marker {
        Marker {
            lat,
            lon,
            altitude_m: 5.0,
            style: MarkerStyle::Billboard {
                icon: Icon::Camera,
                size_px: 14.0,
                color: Color::rgb(0xff, 0x33, 0x66),
                rotation_deg: 0.0,
            },
            highlighted: false,
            payload: MarkerPayload::Camera(track_feeds::CameraMarker {
                id: id.to_string(),
                name: id.to_string(),
                lat,
                lon,
                source: None,
                slug: None,
                image_url: None,
                video_url: None,
                stream_type: None,
            }),
        }
    }

    #[test]
    fn test_color_from_hex() {
        assert_eq!(Color::from_hex("#00ff41"), Some(Color::rgb(0, 255, 65)));
        assert_eq!(Color::from_hex("00ff41"), None);
        assert_eq!(Color::from_hex("#00ff4"), None);
        assert_eq!(Color::from_hex("#zzzzzz"), None);
    }

    #[test]
    fn test_batch_lifecycle() {
        let mut renderer = HeadlessRenderer::default();
        let batch = renderer.create_batch("cameras").unwrap();

        renderer
            .populate_batch(batch, vec![camera_marker("a", 1.0, 1.0)])
            .unwrap();
        assert_eq!(renderer.batch_by_name("cameras").unwrap().markers.len(), 1);

        renderer.clear_batch(batch).unwrap();
        assert!(renderer.batch_by_name("cameras").unwrap().markers.is_empty());

        renderer.destroy_batch(batch).unwrap();
        assert_eq!(
            renderer.destroy_batch(batch),
            Err(RendererError::UnknownBatch(batch.0))
        );
    }

    #[test]
    fn test_pick_nearest_visible_marker() {
        let mut renderer = HeadlessRenderer::default();
        let batch = renderer.create_batch("cameras").unwrap();
        renderer
            .populate_batch(
                batch,
                vec![camera_marker("near", 10.0, 10.0), camera_marker("far", 10.3, 10.3)],
            )
            .unwrap();

        match renderer.pick(10.1, 10.1) {
            Some(MarkerPayload::Camera(camera)) => assert_eq!(camera.id, "near"),
            other => panic!("unexpected pick {:?}", other),
        }
        assert!(renderer.pick(50.0, 50.0).is_none());

        renderer.set_batch_visible(batch, false).unwrap();
        assert!(renderer.pick(10.0, 10.0).is_none());
    }

    #[test]
    fn test_stage_registration() {
        let mut renderer = HeadlessRenderer::default();
        let descriptor = StageDescriptor {
            name: "wv_crt",
            source: StageSource::Glsl("void main() {}"),
            uniforms: vec![("scanlineIntensity", 0.7)],
        };

        let stage = renderer.add_stage(&descriptor).unwrap();
        assert_eq!(
            renderer.add_stage(&descriptor),
            Err(RendererError::DuplicateStage("wv_crt".to_string()))
        );

        renderer.set_uniform(stage, "scanlineIntensity", 0.2).unwrap();
        assert_eq!(
            renderer.stage_by_name("wv_crt").unwrap().uniforms["scanlineIntensity"],
            0.2
        );

        renderer.refuse_stage("wv_bloom");
        let bloom = StageDescriptor {
            name: "wv_bloom",
            source: StageSource::Builtin("bloom"),
            uniforms: vec![],
        };
        assert!(matches!(
            renderer.add_stage(&bloom),
            Err(RendererError::StageUnavailable(_))
        ));
    }
}
