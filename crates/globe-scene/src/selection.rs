//! Selection & Pick Controller
//!
//! Two states: idle, or tracking exactly one entity. Satellite selections
//! also own a single orbit-preview polyline that is torn down whenever the
//! selection changes or clears.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use orbital_mechanics::{ground_track, ElementSet};
use track_feeds::CameraMarker;

use crate::entity::{EntityKind, MarkerPayload, TrackedEntity};
use crate::layers::SceneData;
use crate::renderer::{CameraFlight, Color, Polyline, PolylineHandle, Renderer};

pub const ORBIT_PREVIEW_STEPS: u32 = 95;
const ORBIT_PREVIEW_STEP_MINUTES: i64 = 1;
const ORBIT_WIDTH: f32 = 1.2;
const ORBIT_GLOW: f32 = 0.15;
const ORBIT_COLOR: Color = Color::rgb(0x00, 0xff, 0x41).with_alpha(0.6);

const FOLLOW_DURATION: Duration = Duration::from_secs(2);
const FOLLOW_STANDOFF_M: f64 = 500_000.0;
const FOLLOW_MIN_ALTITUDE_M: f64 = 800_000.0;
const FLIGHT_LIFT_M: f64 = 50_000.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "state", content = "entity", rename_all = "lowercase")]
pub enum SelectionState {
    #[default]
    Idle,
    Tracking(TrackedEntity),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PickOutcome {
    Tracking(TrackedEntity),
    /// Camera markers open a detail view and leave the selection alone
    CameraDetail(CameraMarker),
    Cleared,
}

#[derive(Debug, Default)]
pub struct SelectionController {
    state: SelectionState,
    orbit_preview: Option<PolylineHandle>,
    active_camera: Option<CameraMarker>,
}

impl SelectionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn tracked(&self) -> Option<&TrackedEntity> {
        match &self.state {
            SelectionState::Tracking(entity) => Some(entity),
            SelectionState::Idle => None,
        }
    }

    pub fn active_camera(&self) -> Option<&CameraMarker> {
        self.active_camera.as_ref()
    }

    pub fn close_camera(&mut self) -> bool {
        self.active_camera.take().is_some()
    }

    pub fn has_orbit_preview(&self) -> bool {
        self.orbit_preview.is_some()
    }

    /// Resolve a screen-space pick. `None` means empty space was clicked.
    pub fn handle_pick<R: Renderer>(
        &mut self,
        renderer: &mut R,
        picked: Option<MarkerPayload>,
        data: &SceneData,
        now: DateTime<Utc>,
    ) -> PickOutcome {
        match picked {
            None => {
                self.deselect(renderer);
                PickOutcome::Cleared
            }
            Some(MarkerPayload::Camera(camera)) => {
                info!(camera = %camera.id, "opening camera detail");
                self.active_camera = Some(camera.clone());
                PickOutcome::CameraDetail(camera)
            }
            Some(payload) => match payload.to_tracked() {
                Some(entity) => self.track(renderer, entity, data, now),
                None => PickOutcome::Cleared,
            },
        }
    }

    /// Start tracking `entity`, replacing any previous selection and preview.
    pub fn track<R: Renderer>(
        &mut self,
        renderer: &mut R,
        entity: TrackedEntity,
        data: &SceneData,
        now: DateTime<Utc>,
    ) -> PickOutcome {
        self.clear_orbit(renderer);

        if entity.kind == EntityKind::Satellite {
            match data.tracked_satellite(&entity) {
                Some(set) => self.orbit_preview = draw_orbit(renderer, set, now),
                None => debug!(satellite = %entity.id, "no element set for orbit preview"),
            }
        }

        if let Some(flight) = follow_flight(&entity) {
            renderer.fly_to(flight);
        }

        info!(kind = %entity.kind, id = %entity.id, "tracking entity");
        self.state = SelectionState::Tracking(entity.clone());
        PickOutcome::Tracking(entity)
    }

    /// Back to idle. Returns `true` if something was tracked.
    pub fn deselect<R: Renderer>(&mut self, renderer: &mut R) -> bool {
        self.clear_orbit(renderer);
        let was_tracking = matches!(self.state, SelectionState::Tracking(_));
        if was_tracking {
            debug!("selection cleared");
        }
        self.state = SelectionState::Idle;
        was_tracking
    }

    /// Swap in fresh attributes for the tracked entity without changing which
    /// entity is tracked.
    pub fn refresh_tracked(&mut self, entity: TrackedEntity) -> bool {
        if let SelectionState::Tracking(current) = &mut self.state {
            if current.id == entity.id && current.kind == entity.kind {
                *current = entity;
                return true;
            }
        }
        false
    }

    pub fn teardown<R: Renderer>(&mut self, renderer: &mut R) {
        self.deselect(renderer);
        self.active_camera = None;
    }

    fn clear_orbit<R: Renderer>(&mut self, renderer: &mut R) {
        if let Some(handle) = self.orbit_preview.take() {
            if let Err(e) = renderer.remove_polyline(handle) {
                warn!("failed to remove orbit preview: {}", e);
            }
        }
    }
}

fn draw_orbit<R: Renderer>(
    renderer: &mut R,
    set: &ElementSet,
    now: DateTime<Utc>,
) -> Option<PolylineHandle> {
    let points = ground_track(
        set,
        now,
        ORBIT_PREVIEW_STEPS,
        chrono::Duration::minutes(ORBIT_PREVIEW_STEP_MINUTES),
    );
    if points.len() < 2 {
        debug!(satellite = set.name(), points = points.len(), "orbit preview too short");
        return None;
    }

    let polyline = Polyline {
        points,
        width: ORBIT_WIDTH,
        glow: ORBIT_GLOW,
        color: ORBIT_COLOR,
    };
    match renderer.add_polyline(polyline) {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(satellite = set.name(), "failed to add orbit preview: {}", e);
            None
        }
    }
}

/// Camera flight that keeps a picked satellite or flight in view.
pub fn follow_flight(entity: &TrackedEntity) -> Option<CameraFlight> {
    let base_m = match entity.kind {
        EntityKind::Satellite => entity.altitude_m,
        EntityKind::Flight => entity.altitude_m + FLIGHT_LIFT_M,
        EntityKind::Earthquake | EntityKind::Camera => return None,
    };

    Some(CameraFlight {
        lat: entity.lat,
        lon: entity.lon,
        altitude_m: (base_m + FOLLOW_STANDOFF_M).max(FOLLOW_MIN_ALTITUDE_M),
        heading_deg: 0.0,
        pitch_deg: -90.0,
        duration: FOLLOW_DURATION,
    })
}
