//! Globe View
//!
//! The single writer of all scene state. Feed updates, timers and control
//! commands are multiplexed onto one task, so no scene structure is ever
//! touched from two places at once. Commands arrive over an `mpsc` channel
//! and are answered over `oneshot` with a fresh [`SceneStatus`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use track_feeds::{
    CameraMarker, FeedKind, FeedOutcome, FeedSchedule, FeedSource, FeedUpdate, IngestionHandle,
    IngestionScheduler, LivenessGuard,
};

use crate::controls::{self, City, GeocodeResult, KeyAction, CITY_FLIGHT, LANDMARK_FLIGHT};
use crate::effects::{EffectMode, EffectPipeline, ShaderEffectState, ShaderParam};
use crate::entity::TrackedEntity;
use crate::layers::{DensityMode, LayerBatchManager, LayerId, LayerVisibility, RefreshContext, SceneData};
use crate::lod::{self, CameraLodController, LodReading};
use crate::renderer::{CameraFlight, Renderer};
use crate::selection::{PickOutcome, SelectionController};
use crate::{Result, SceneError};

/// Satellite positions are recomputed on this cadence between catalog refreshes.
pub const PROPAGATION_INTERVAL: Duration = Duration::from_secs(3);
/// Stand-in for the renderer's post-frame callback.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(100);

const UPDATE_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// Commands and status
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ViewAction {
    Key(String),
    SetLayerVisible(LayerId, bool),
    SetDensity(DensityMode),
    SetMode(EffectMode),
    SetParam(ShaderParam, f64),
    /// Screen-space pick
    Pick { x: f64, y: f64 },
    Deselect,
    CloseCamera,
    FlyTo(CameraFlight),
    Geocode(GeocodeResult),
    SelectCity(String),
    Status,
}

#[derive(Debug)]
pub struct ViewCommand {
    pub action: ViewAction,
    pub reply: oneshot::Sender<Result<SceneStatus>>,
}

impl ViewCommand {
    pub fn new(action: ViewAction) -> (Self, oneshot::Receiver<Result<SceneStatus>>) {
        let (reply, rx) = oneshot::channel();
        (Self { action, reply }, rx)
    }
}

/// Send one action to a running view and wait for the resulting status.
pub async fn request(commands: &mpsc::Sender<ViewCommand>, action: ViewAction) -> Result<SceneStatus> {
    let (command, reply) = ViewCommand::new(action);
    commands
        .send(command)
        .await
        .map_err(|_| SceneError::ViewClosed)?;
    reply.await.map_err(|_| SceneError::ViewClosed)?
}

#[derive(Debug, Clone, Serialize)]
pub struct LayerStatus {
    pub layer: LayerId,
    pub visible: bool,
    pub records: usize,
    pub rendered: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SceneStatus {
    pub mounted: bool,
    pub generation: u64,
    pub layers: Vec<LayerStatus>,
    pub density: DensityMode,
    pub lod: LodReading,
    pub effects: ShaderEffectState,
    pub tracked: Option<TrackedEntity>,
    pub active_camera: Option<CameraMarker>,
    pub city: &'static str,
}

impl SceneStatus {
    pub fn layer(&self, layer: LayerId) -> Option<&LayerStatus> {
        self.layers.iter().find(|l| l.layer == layer)
    }
}

#[derive(Debug, Default, Clone)]
struct FeedHealth {
    last_seq: u64,
    last_update: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

// ============================================================================
// View
// ============================================================================

pub struct GlobeView<R: Renderer, S: FeedSource> {
    renderer: R,
    source: Arc<S>,
    schedule: FeedSchedule,
    clock: fn() -> DateTime<Utc>,

    data: SceneData,
    layers: LayerBatchManager,
    lod: CameraLodController,
    selection: SelectionController,
    effects: EffectPipeline,
    visibility: LayerVisibility,
    density: DensityMode,
    city: &'static City,

    generation: u64,
    ingestion: Option<IngestionHandle>,
    feed_health: BTreeMap<FeedKind, FeedHealth>,
    updates_tx: mpsc::Sender<FeedUpdate>,
    updates_rx: mpsc::Receiver<FeedUpdate>,
}

impl<R: Renderer, S: FeedSource> GlobeView<R, S> {
    pub fn new(renderer: R, source: Arc<S>, schedule: FeedSchedule) -> Self {
        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            renderer,
            source,
            schedule,
            clock: Utc::now,
            data: SceneData::default(),
            layers: LayerBatchManager::new(),
            lod: CameraLodController::default(),
            selection: SelectionController::new(),
            effects: EffectPipeline::new(),
            visibility: LayerVisibility::default(),
            density: DensityMode::default(),
            city: controls::default_city(),
            generation: 0,
            ingestion: None,
            feed_health: BTreeMap::new(),
            updates_tx,
            updates_rx,
        }
    }

    pub fn with_density(mut self, density: DensityMode) -> Self {
        self.density = density;
        self
    }

    /// Override the propagation clock.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn is_mounted(&self) -> bool {
        self.ingestion.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Create batches and stages, then start ingestion. Returns `false` if the
    /// view was already mounted.
    pub fn mount(&mut self) -> Result<bool> {
        if self.is_mounted() {
            debug!(generation = self.generation, "globe view already mounted");
            return Ok(false);
        }

        self.layers.mount(&mut self.renderer)?;
        self.effects.initialize(&mut self.renderer);
        self.lod.reset();
        self.lod.sample(self.renderer.camera_altitude());
        self.lod.poll();
        self.lod.poll_camera_gate();

        self.generation += 1;
        self.feed_health.clear();
        self.ingestion = Some(IngestionScheduler::start(
            self.source.clone(),
            &self.schedule,
            LivenessGuard::new(self.generation),
            self.updates_tx.clone(),
        ));

        self.refresh_all();
        info!(generation = self.generation, "globe view mounted");
        Ok(true)
    }

    /// Stop ingestion and release every renderer resource exactly once.
    /// Returns `false` if there was nothing to tear down.
    pub fn teardown(&mut self) -> bool {
        let Some(ingestion) = self.ingestion.take() else {
            return false;
        };
        ingestion.stop();

        self.selection.teardown(&mut self.renderer);
        self.layers.teardown(&mut self.renderer);
        self.effects.reset(&mut self.renderer);
        self.data.clear();
        self.feed_health.clear();
        while self.updates_rx.try_recv().is_ok() {}

        info!(generation = self.generation, "globe view torn down");
        true
    }

    // ------------------------------------------------------------------------
    // Event handlers
    // ------------------------------------------------------------------------

    /// Consume one feed update. Returns `true` when scene data changed.
    pub fn handle_feed_update(&mut self, update: FeedUpdate) -> bool {
        if !self.is_mounted() || update.generation != self.generation {
            debug!(
                feed = %update.kind,
                generation = update.generation,
                current = self.generation,
                "dropping update from a previous mount"
            );
            return false;
        }

        let health = self.feed_health.entry(update.kind).or_default();
        if update.seq <= health.last_seq {
            debug!(feed = %update.kind, seq = update.seq, last = health.last_seq, "dropping out-of-order update");
            return false;
        }
        health.last_seq = update.seq;

        match update.outcome {
            FeedOutcome::Failed(reason) => {
                debug!(feed = %update.kind, "keeping last good data after failed cycle");
                health.last_error = Some(reason);
                false
            }
            FeedOutcome::Updated(payload) => {
                health.last_update = Some(update.received_at);
                health.last_error = None;
                let layer = self.data.apply(payload);
                self.refresh_layer(layer);
                true
            }
        }
    }

    pub fn on_frame(&mut self) {
        self.lod.sample(self.renderer.camera_altitude());
    }

    /// Poll the LOD controller. Returns the published reading, if any. The
    /// camera layer re-renders whenever its raw-sample gate changes.
    pub fn poll_lod(&mut self) -> Option<LodReading> {
        let published = self.lod.poll();
        if self.lod.poll_camera_gate().is_some() && self.is_mounted() {
            self.refresh_layer(LayerId::Cameras);
        }
        published
    }

    pub fn propagate(&mut self) {
        if self.is_mounted() {
            self.refresh_layer(LayerId::Satellites);
        }
    }

    pub fn handle_action(&mut self, action: ViewAction) -> Result<SceneStatus> {
        if action == ViewAction::Status {
            return Ok(self.status());
        }
        if !self.is_mounted() {
            return Err(SceneError::NotMounted);
        }

        match action {
            ViewAction::Key(key) => self.handle_key(&key),
            ViewAction::SetLayerVisible(layer, visible) => {
                if self.visibility.set(layer, visible) {
                    info!(layer = %layer, visible, "layer visibility changed");
                    self.refresh_layer(layer);
                }
            }
            ViewAction::SetDensity(density) => {
                if self.density != density {
                    self.density = density;
                    info!(density = ?density, "density mode changed");
                    self.refresh_layer(LayerId::Satellites);
                }
            }
            ViewAction::SetMode(mode) => {
                self.effects.set_mode(&mut self.renderer, mode);
            }
            ViewAction::SetParam(param, value) => {
                self.effects.set_param(&mut self.renderer, param, value);
            }
            ViewAction::Pick { x, y } => {
                let picked = self.renderer.pick(x, y);
                let now = (self.clock)();
                let outcome = self
                    .selection
                    .handle_pick(&mut self.renderer, picked, &self.data, now);
                if !matches!(outcome, PickOutcome::CameraDetail(_)) {
                    self.refresh_all();
                }
            }
            ViewAction::Deselect => {
                if self.selection.deselect(&mut self.renderer) {
                    self.refresh_all();
                }
            }
            ViewAction::CloseCamera => {
                self.selection.close_camera();
            }
            ViewAction::FlyTo(flight) => self.renderer.fly_to(flight),
            ViewAction::Geocode(result) => {
                let flight = controls::geocode_flight(&result);
                debug!(lat = result.lat, lon = result.lon, altitude_m = flight.altitude_m, "geocoder fly-to");
                self.renderer.fly_to(flight);
            }
            ViewAction::SelectCity(id) => {
                let city = controls::find_city(&id).ok_or(SceneError::UnknownCity(id))?;
                self.city = city;
                info!(city = city.name, "city selected");
                self.renderer.fly_to(city.home().flight(CITY_FLIGHT));
            }
            ViewAction::Status => {}
        }

        Ok(self.status())
    }

    fn handle_key(&mut self, key: &str) {
        match controls::key_action(key) {
            Some(KeyAction::SelectMode(mode)) => {
                self.effects.set_mode(&mut self.renderer, mode);
            }
            Some(KeyAction::FlyToLandmark(key)) => {
                if let Some(landmark) = self.city.landmark(key) {
                    debug!(landmark = landmark.name, "landmark fly-to");
                    self.renderer.fly_to(landmark.flight(LANDMARK_FLIGHT));
                }
            }
            Some(KeyAction::ClearSelection) => {
                if self.selection.deselect(&mut self.renderer) {
                    self.refresh_all();
                }
            }
            None => debug!(key, "unbound key"),
        }
    }

    // ------------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------------

    fn refresh_layer(&mut self, layer: LayerId) {
        let ctx = RefreshContext {
            visibility: &self.visibility,
            density: self.density,
            tracked: self.selection.tracked(),
            lod: self.lod.camera_reading(),
            now: (self.clock)(),
        };
        let result = self.layers.refresh(&mut self.renderer, layer, &self.data, &ctx);

        match result {
            Ok(Some(entity)) => {
                self.selection.refresh_tracked(entity);
            }
            Ok(None) => {}
            Err(e) => warn!(layer = %layer, "layer refresh failed: {}", e),
        }
    }

    fn refresh_all(&mut self) {
        for layer in LayerId::ALL {
            self.refresh_layer(layer);
        }
    }

    pub fn status(&self) -> SceneStatus {
        let layers = LayerId::ALL
            .into_iter()
            .map(|layer| {
                let health = FeedKind::ALL
                    .into_iter()
                    .find(|kind| LayerId::for_feed(*kind) == layer)
                    .and_then(|kind| self.feed_health.get(&kind));
                LayerStatus {
                    layer,
                    visible: self.visibility.get(layer),
                    records: self.data.record_count(layer),
                    rendered: self.layers.rendered_count(layer),
                    last_update: health.and_then(|h| h.last_update),
                    last_error: health.and_then(|h| h.last_error.clone()),
                }
            })
            .collect();

        SceneStatus {
            mounted: self.is_mounted(),
            generation: self.generation,
            layers,
            density: self.density,
            lod: self.lod.reading(),
            effects: *self.effects.state(),
            tracked: self.selection.tracked().cloned(),
            active_camera: self.selection.active_camera().cloned(),
            city: self.city.id,
        }
    }

    // ------------------------------------------------------------------------
    // Event loop
    // ------------------------------------------------------------------------

    /// Mount, then serve feed updates, timers and commands until the command
    /// channel closes or `shutdown` resolves. Tears down before returning.
    pub async fn run<F>(mut self, mut commands: mpsc::Receiver<ViewCommand>, shutdown: F) -> Self
    where
        F: Future<Output = ()>,
    {
        if let Err(e) = self.mount() {
            error!("failed to mount globe view: {}", e);
            return self;
        }

        let mut propagation = time::interval(PROPAGATION_INTERVAL);
        let mut lod_poll = time::interval(lod::POLL_INTERVAL);
        let mut frame = time::interval(FRAME_INTERVAL);
        for interval in [&mut propagation, &mut lod_poll, &mut frame] {
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        }
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                Some(update) = self.updates_rx.recv() => {
                    self.handle_feed_update(update);
                }
                _ = propagation.tick() => self.propagate(),
                _ = frame.tick() => self.on_frame(),
                _ = lod_poll.tick() => {
                    self.poll_lod();
                }
                command = commands.recv() => match command {
                    Some(ViewCommand { action, reply }) => {
                        let _ = reply.send(self.handle_action(action));
                    }
                    None => {
                        debug!("command channel closed");
                        break;
                    }
                },
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
            }
        }

        self.teardown();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;
    use crate::layers::tests::{camera, element_records, flight};
    use crate::renderer::HeadlessRenderer;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use track_feeds::{FeedError, FeedPayload};

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 7, 13, 0, 0, 0).unwrap()
    }

    /// Serves canned payloads; feeds without one fail with a 500.
    #[derive(Default)]
    struct CannedSource {
        payloads: Mutex<HashMap<FeedKind, FeedPayload>>,
    }

    impl CannedSource {
        fn with(self, payload: FeedPayload) -> Self {
            self.payloads.lock().unwrap().insert(payload.kind(), payload);
            self
        }
    }

    impl FeedSource for CannedSource {
        fn fetch(&self, kind: FeedKind) -> impl Future<Output = track_feeds::Result<FeedPayload>> + Send {
            let result = self
                .payloads
                .lock()
                .unwrap()
                .get(&kind)
                .cloned()
                .ok_or(FeedError::Status {
                    feed: kind.to_string(),
                    status: 500,
                });
            async move { result }
        }
    }

    type TestView = GlobeView<HeadlessRenderer, CannedSource>;

    fn view(source: CannedSource) -> TestView {
        GlobeView::new(HeadlessRenderer::default(), Arc::new(source), FeedSchedule::default())
            .with_clock(fixed_now)
    }

    fn update(view: &TestView, seq: u64, outcome: FeedOutcome, kind: FeedKind) -> FeedUpdate {
        FeedUpdate {
            generation: view.generation(),
            kind,
            seq,
            received_at: fixed_now(),
            outcome,
        }
    }

    fn updated(view: &TestView, seq: u64, payload: FeedPayload) -> FeedUpdate {
        let kind = payload.kind();
        update(view, seq, FeedOutcome::Updated(payload), kind)
    }

    #[tokio::test]
    async fn test_mount_and_teardown_are_idempotent() {
        let mut view = view(CannedSource::default());

        assert!(view.mount().unwrap());
        assert!(!view.mount().unwrap());
        assert_eq!(view.renderer().batch_count(), 5);
        assert_eq!(view.renderer().stage_count(), 5);
        assert_eq!(view.generation(), 1);

        assert!(view.teardown());
        assert!(!view.teardown());
        assert_eq!(view.renderer().batch_count(), 0);
        assert_eq!(view.renderer().stage_count(), 0);

        assert!(view.mount().unwrap());
        assert_eq!(view.generation(), 2);
        assert_eq!(view.renderer().batch_count(), 5);
        assert_eq!(view.renderer().stage_count(), 5);
    }

    #[tokio::test]
    async fn test_failed_cycle_keeps_last_good_batch() {
        let mut view = view(CannedSource::default());
        view.mount().unwrap();

        let military = vec![
            flight("mil1", Some(10.0), Some(10.0), false),
            flight("mil2", Some(11.0), Some(11.0), false),
        ];
        assert!(view.handle_feed_update(updated(&view, 1, FeedPayload::MilitaryFlights(military))));
        let before = view.renderer().batch_by_name("military").unwrap().markers.clone();
        assert_eq!(before.len(), 2);

        let failed = update(
            &view,
            2,
            FeedOutcome::Failed("Feed military_flights returned status 500".to_string()),
            FeedKind::MilitaryFlights,
        );
        assert!(!view.handle_feed_update(failed));

        assert_eq!(view.renderer().batch_by_name("military").unwrap().markers, before);
        let status = view.status();
        let military = status.layer(LayerId::Military).unwrap();
        assert_eq!(military.records, 2);
        assert!(military.last_error.as_deref().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_stale_and_out_of_order_updates_dropped() {
        let mut view = view(CannedSource::default());
        view.mount().unwrap();
        let stale = updated(&view, 1, FeedPayload::Flights(vec![flight("old", Some(1.0), Some(1.0), false)]));

        view.teardown();
        view.mount().unwrap();
        assert!(!view.handle_feed_update(stale));
        assert_eq!(view.status().layer(LayerId::Flights).unwrap().records, 0);

        let newer = updated(&view, 5, FeedPayload::Flights(vec![flight("new", Some(2.0), Some(2.0), false)]));
        let older = updated(&view, 4, FeedPayload::Flights(vec![]));
        assert!(view.handle_feed_update(newer));
        assert!(!view.handle_feed_update(older));

        let batch = view.renderer().batch_by_name("flights").unwrap();
        assert_eq!(batch.markers.len(), 1);
        assert_eq!(batch.markers[0].payload.id(), "new");
    }

    #[tokio::test]
    async fn test_updates_ignored_after_teardown() {
        let mut view = view(CannedSource::default());
        view.mount().unwrap();
        let pending = updated(&view, 1, FeedPayload::Cameras(vec![camera("c1")]));
        view.teardown();

        assert!(!view.handle_feed_update(pending));
        assert_eq!(view.renderer().batch_count(), 0);
    }

    #[tokio::test]
    async fn test_tracked_flight_follows_refresh() {
        let mut view = view(CannedSource::default());
        view.mount().unwrap();
        view.handle_feed_update(updated(
            &view,
            1,
            FeedPayload::Flights(vec![flight("ABC123", Some(40.0), Some(-73.0), false)]),
        ));

        let status = view.handle_action(ViewAction::Pick { x: -73.0, y: 40.0 }).unwrap();
        let tracked = status.tracked.unwrap();
        assert_eq!(tracked.id, "ABC123");
        assert_eq!(tracked.kind, EntityKind::Flight);
        assert!(view.renderer().batch_by_name("flights").unwrap().markers[0].highlighted);

        view.handle_feed_update(updated(
            &view,
            2,
            FeedPayload::Flights(vec![flight("ABC123", Some(40.5), Some(-72.5), false)]),
        ));
        let tracked = view.status().tracked.unwrap();
        assert_eq!(tracked.id, "ABC123");
        assert_eq!(tracked.lat, 40.5);
        assert_eq!(tracked.lon, -72.5);
    }

    #[tokio::test]
    async fn test_keys_drive_modes_and_selection() {
        let mut view = view(CannedSource::default());
        view.mount().unwrap();
        view.handle_feed_update(updated(&view, 1, FeedPayload::OrbitalElements(element_records(3))));

        let status = view.handle_action(ViewAction::Key("2".to_string())).unwrap();
        assert_eq!(status.effects.active_mode(), EffectMode::Crt);
        assert_eq!(view.renderer().enabled_stages(), vec!["wv_crt"]);

        let marker = view.renderer().batch_by_name("satellites").unwrap().markers[0].clone();
        let status = view
            .handle_action(ViewAction::Pick { x: marker.lon, y: marker.lat })
            .unwrap();
        assert_eq!(status.tracked.unwrap().kind, EntityKind::Satellite);
        assert_eq!(view.renderer().polyline_count(), 1);

        let status = view.handle_action(ViewAction::Key("Escape".to_string())).unwrap();
        assert!(status.tracked.is_none());
        assert_eq!(view.renderer().polyline_count(), 0);
    }

    #[tokio::test]
    async fn test_camera_layer_follows_lod() {
        let mut view = view(CannedSource::default());
        view.mount().unwrap();
        view.handle_feed_update(updated(&view, 1, FeedPayload::Cameras(vec![camera("c1")])));

        let cameras = view.renderer().batch_by_name("cameras").unwrap();
        assert!(!cameras.visible);

        view.renderer_mut().set_camera_altitude(20_000.0);
        view.on_frame();
        let reading = view.poll_lod().unwrap();
        assert_eq!(reading.altitude_m, 20_000.0);

        let cameras = view.renderer().batch_by_name("cameras").unwrap();
        assert!(cameras.visible);
        assert_eq!(cameras.markers.len(), 1);

        // Jitter inside the band publishes nothing
        view.renderer_mut().set_camera_altitude(21_000.0);
        view.on_frame();
        assert!(view.poll_lod().is_none());
    }

    #[tokio::test]
    async fn test_camera_ceiling_crossed_inside_band() {
        let mut view = view(CannedSource::default());
        view.mount().unwrap();
        view.renderer_mut().set_camera_altitude(14_999_000.0);
        view.on_frame();
        view.poll_lod();
        view.handle_feed_update(updated(&view, 1, FeedPayload::Cameras(vec![camera("c1")])));
        assert!(view.renderer().batch_by_name("cameras").unwrap().visible);

        // 4 km of climb stays inside the band but crosses the ceiling
        view.renderer_mut().set_camera_altitude(15_003_000.0);
        view.on_frame();
        assert!(view.poll_lod().is_none());
        assert_eq!(view.status().lod.altitude_m, 14_999_000.0);
        assert!(!view.renderer().batch_by_name("cameras").unwrap().visible);
    }

    #[tokio::test]
    async fn test_camera_pick_opens_detail() {
        let mut view = view(CannedSource::default());
        view.mount().unwrap();
        view.renderer_mut().set_camera_altitude(10_000.0);
        view.on_frame();
        view.poll_lod();
        view.handle_feed_update(updated(&view, 1, FeedPayload::Cameras(vec![camera("c1")])));

        let status = view.handle_action(ViewAction::Pick { x: -0.12, y: 51.5 }).unwrap();
        assert_eq!(status.active_camera.unwrap().id, "c1");
        assert!(status.tracked.is_none());

        let status = view.handle_action(ViewAction::CloseCamera).unwrap();
        assert!(status.active_camera.is_none());
    }

    #[tokio::test]
    async fn test_layer_toggle_and_density() {
        let mut view = view(CannedSource::default());
        view.mount().unwrap();
        view.handle_feed_update(updated(&view, 1, FeedPayload::OrbitalElements(element_records(600))));
        assert_eq!(view.status().layer(LayerId::Satellites).unwrap().rendered, 300);

        let status = view.handle_action(ViewAction::SetDensity(DensityMode::Full)).unwrap();
        assert_eq!(status.layer(LayerId::Satellites).unwrap().rendered, 600);

        let status = view
            .handle_action(ViewAction::SetLayerVisible(LayerId::Satellites, false))
            .unwrap();
        let satellites = status.layer(LayerId::Satellites).unwrap();
        assert!(!satellites.visible);
        assert_eq!(satellites.rendered, 0);
        assert!(!view.renderer().batch_by_name("satellites").unwrap().visible);
    }

    #[tokio::test]
    async fn test_city_and_geocode_flights() {
        let mut view = view(CannedSource::default());
        view.mount().unwrap();

        let status = view.handle_action(ViewAction::SelectCity("tokyo".to_string())).unwrap();
        assert_eq!(status.city, "tokyo");
        let flight = view.renderer().last_flight().unwrap();
        assert_eq!(flight.duration, CITY_FLIGHT);
        assert_eq!(flight.lat, 35.6595);

        view.handle_action(ViewAction::Key("w".to_string())).unwrap();
        let flight = view.renderer().last_flight().unwrap();
        assert_eq!(flight.duration, LANDMARK_FLIGHT);
        assert_eq!(flight.lat, 35.6586);

        view.handle_action(ViewAction::Geocode(GeocodeResult {
            name: None,
            lat: 10.0,
            lon: 20.0,
            bounding_box: None,
        }))
        .unwrap();
        assert_eq!(view.renderer().last_flight().unwrap().altitude_m, 200_000.0);

        assert!(matches!(
            view.handle_action(ViewAction::SelectCity("atlantis".to_string())),
            Err(SceneError::UnknownCity(_))
        ));
    }

    #[tokio::test]
    async fn test_actions_rejected_when_unmounted() {
        let mut view = view(CannedSource::default());
        assert!(matches!(
            view.handle_action(ViewAction::SetMode(EffectMode::Thermal)),
            Err(SceneError::NotMounted)
        ));
        assert!(!view.handle_action(ViewAction::Status).unwrap().mounted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_ingests_and_serves_commands() {
        let source = CannedSource::default()
            .with(FeedPayload::Flights(vec![flight("ABC123", Some(40.0), Some(-73.0), false)]))
            .with(FeedPayload::Cameras(vec![camera("c1")]));
        let (commands, rx) = mpsc::channel(8);

        let driver = async move {
            time::sleep(Duration::from_secs(2)).await;

            let status = request(&commands, ViewAction::Status).await.unwrap();
            assert!(status.mounted);
            assert_eq!(status.layer(LayerId::Flights).unwrap().rendered, 1);
            assert!(status.layer(LayerId::Military).unwrap().last_error.is_some());

            let status = request(&commands, ViewAction::Pick { x: -73.0, y: 40.0 }).await.unwrap();
            assert_eq!(status.tracked.unwrap().id, "ABC123");

            let status = request(&commands, ViewAction::SetMode(EffectMode::Flare)).await.unwrap();
            assert!(status.effects.bloom_enabled());
        };

        let (view, ()) = tokio::join!(view(source).run(rx, std::future::pending()), driver);

        assert!(!view.is_mounted());
        assert_eq!(view.renderer().batch_count(), 0);
        assert_eq!(view.renderer().stage_count(), 0);
    }
}
