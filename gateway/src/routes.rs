use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

use globe_scene::controls::GeocodeResult;
use globe_scene::renderer::CameraFlight;
use globe_scene::{
    request, DensityMode, EffectMode, LayerId, SceneError, SceneStatus, ShaderParam, ViewAction,
    ViewCommand,
};
use track_feeds::{CameraMarker, FeedClient, FeedError, ResolvedStream};

#[derive(Clone)]
pub struct AppState {
    pub commands: mpsc::Sender<ViewCommand>,
    pub feeds: FeedClient,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

fn scene_error(e: SceneError) -> (StatusCode, String) {
    let status = match &e {
        SceneError::NotMounted | SceneError::ViewClosed => StatusCode::SERVICE_UNAVAILABLE,
        SceneError::Renderer(_) => StatusCode::INTERNAL_SERVER_ERROR,
        SceneError::UnknownLayer(_)
        | SceneError::UnknownParam(_)
        | SceneError::UnknownMode(_)
        | SceneError::UnknownDensity(_) => StatusCode::BAD_REQUEST,
        SceneError::UnknownCity(_) => StatusCode::NOT_FOUND,
    };
    (status, e.to_string())
}

fn feed_error(e: FeedError) -> (StatusCode, String) {
    let status = match &e {
        FeedError::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_GATEWAY,
    };
    (status, e.to_string())
}

async fn dispatch(state: &AppState, action: ViewAction) -> ApiResult<SceneStatus> {
    request(&state.commands, action)
        .await
        .map(Json)
        .map_err(scene_error)
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct KeyRequest {
    pub key: String,
}

#[derive(Deserialize)]
pub struct LayerRequest {
    pub visible: bool,
}

#[derive(Deserialize)]
pub struct DensityRequest {
    pub density: String,
}

#[derive(Deserialize)]
pub struct ModeRequest {
    pub mode: String,
}

#[derive(Deserialize)]
pub struct ParamRequest {
    pub param: String,
    pub value: f64,
}

/// Screen coordinates of a click
#[derive(Deserialize)]
pub struct PickRequest {
    pub x: f64,
    pub y: f64,
}

#[derive(Deserialize)]
pub struct CityRequest {
    pub city: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlyToRequest {
    pub lat: f64,
    pub lon: f64,
    pub altitude_m: f64,
    #[serde(default)]
    pub heading_deg: f64,
    #[serde(default = "default_pitch")]
    pub pitch_deg: f64,
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,
}

fn default_pitch() -> f64 {
    -90.0
}

fn default_duration_ms() -> u64 {
    3_000
}

impl From<FlyToRequest> for CameraFlight {
    fn from(req: FlyToRequest) -> Self {
        CameraFlight {
            lat: req.lat,
            lon: req.lon,
            altitude_m: req.altitude_m,
            heading_deg: req.heading_deg,
            pitch_deg: req.pitch_deg,
            duration: Duration::from_millis(req.duration_ms),
        }
    }
}

/// Active camera with its media endpoints.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraDetail {
    pub camera: CameraMarker,
    pub snapshot_url: Option<String>,
    pub stream: Option<ResolvedStream>,
}

// ============================================================================
// Route Handlers
// ============================================================================

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "worldview-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}

/// GET /status
pub async fn get_status(State(state): State<AppState>) -> ApiResult<SceneStatus> {
    dispatch(&state, ViewAction::Status).await
}

/// POST /keys
pub async fn press_key(
    State(state): State<AppState>,
    Json(req): Json<KeyRequest>,
) -> ApiResult<SceneStatus> {
    dispatch(&state, ViewAction::Key(req.key)).await
}

/// PUT /layers/:layer
pub async fn set_layer(
    State(state): State<AppState>,
    Path(layer): Path<String>,
    Json(req): Json<LayerRequest>,
) -> ApiResult<SceneStatus> {
    let layer: LayerId = layer.parse().map_err(scene_error)?;
    dispatch(&state, ViewAction::SetLayerVisible(layer, req.visible)).await
}

/// PUT /density
pub async fn set_density(
    State(state): State<AppState>,
    Json(req): Json<DensityRequest>,
) -> ApiResult<SceneStatus> {
    let density: DensityMode = req.density.parse().map_err(scene_error)?;
    dispatch(&state, ViewAction::SetDensity(density)).await
}

/// PUT /effects/mode
pub async fn set_mode(
    State(state): State<AppState>,
    Json(req): Json<ModeRequest>,
) -> ApiResult<SceneStatus> {
    let mode: EffectMode = req.mode.parse().map_err(scene_error)?;
    dispatch(&state, ViewAction::SetMode(mode)).await
}

/// PUT /effects/params
pub async fn set_param(
    State(state): State<AppState>,
    Json(req): Json<ParamRequest>,
) -> ApiResult<SceneStatus> {
    let param: ShaderParam = req.param.parse().map_err(scene_error)?;
    if !req.value.is_finite() {
        return Err((StatusCode::BAD_REQUEST, format!("Non-finite value for {}", param)));
    }
    dispatch(&state, ViewAction::SetParam(param, req.value)).await
}

/// POST /pick
pub async fn pick(
    State(state): State<AppState>,
    Json(req): Json<PickRequest>,
) -> ApiResult<SceneStatus> {
    dispatch(&state, ViewAction::Pick { x: req.x, y: req.y }).await
}

/// DELETE /selection
pub async fn clear_selection(State(state): State<AppState>) -> ApiResult<SceneStatus> {
    dispatch(&state, ViewAction::Deselect).await
}

/// POST /camera - fly the globe camera
pub async fn fly_to(
    State(state): State<AppState>,
    Json(req): Json<FlyToRequest>,
) -> ApiResult<SceneStatus> {
    dispatch(&state, ViewAction::FlyTo(req.into())).await
}

/// GET /camera/detail - the camera marker opened by the last pick
pub async fn camera_detail(State(state): State<AppState>) -> ApiResult<CameraDetail> {
    let status = dispatch(&state, ViewAction::Status).await?.0;
    let camera = status
        .active_camera
        .ok_or((StatusCode::NOT_FOUND, "No camera selected".to_string()))?;

    let snapshot_url = match camera.image_url.as_deref() {
        Some(image) => Some(state.feeds.snapshot_url(image).map_err(feed_error)?.to_string()),
        None => None,
    };

    let stream = match (&camera.video_url, camera.stream_type) {
        (Some(url), Some(stream_type)) => Some(ResolvedStream {
            url: url.clone(),
            stream_type,
        }),
        _ if camera.needs_stream_resolution() => {
            let slug = camera.slug.as_deref().unwrap_or_default();
            match state.feeds.resolve_stream(slug).await {
                Ok(stream) => Some(stream),
                Err(e) => {
                    // Detail still opens with the snapshot
                    tracing::warn!(camera = %camera.id, "stream resolution failed: {}", e);
                    None
                }
            }
        }
        _ => None,
    };

    Ok(Json(CameraDetail {
        camera,
        snapshot_url,
        stream,
    }))
}

/// GET /camera/snapshot - proxied image bytes for the active camera
pub async fn camera_snapshot(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let status = dispatch(&state, ViewAction::Status).await?.0;
    let image = status
        .active_camera
        .and_then(|c| c.image_url)
        .ok_or((StatusCode::NOT_FOUND, "No snapshot for the selected camera".to_string()))?;

    let bytes = state.feeds.fetch_snapshot(&image).await.map_err(feed_error)?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes))
}

/// DELETE /camera/detail
pub async fn close_camera(State(state): State<AppState>) -> ApiResult<SceneStatus> {
    dispatch(&state, ViewAction::CloseCamera).await
}

/// POST /geocode - fly to a geocoder result
pub async fn geocode(
    State(state): State<AppState>,
    Json(result): Json<GeocodeResult>,
) -> ApiResult<SceneStatus> {
    dispatch(&state, ViewAction::Geocode(result)).await
}

/// PUT /city
pub async fn select_city(
    State(state): State<AppState>,
    Json(req): Json<CityRequest>,
) -> ApiResult<SceneStatus> {
    dispatch(&state, ViewAction::SelectCity(req.city)).await
}

// ============================================================================
// Router
// ============================================================================

pub fn control_routes(state: AppState) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/keys", post(press_key))
        .route("/layers/:layer", put(set_layer))
        .route("/density", put(set_density))
        .route("/effects/mode", put(set_mode))
        .route("/effects/params", put(set_param))
        .route("/pick", post(pick))
        .route("/selection", delete(clear_selection))
        .route("/camera", post(fly_to))
        .route("/camera/detail", get(camera_detail).delete(close_camera))
        .route("/camera/snapshot", get(camera_snapshot))
        .route("/geocode", post(geocode))
        .route("/city", put(select_city))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use globe_scene::{GlobeView, HeadlessRenderer};
    use std::future::Future;
    use std::sync::Arc;
    use tower::ServiceExt;
    use track_feeds::{FeedConfig, FeedKind, FeedPayload, FeedSchedule, FeedSource};

    struct OfflineSource;

    impl FeedSource for OfflineSource {
        fn fetch(&self, kind: FeedKind) -> impl Future<Output = track_feeds::Result<FeedPayload>> + Send {
            async move { Err(FeedError::RequestFailed(format!("{} offline", kind))) }
        }
    }

    fn app() -> Router {
        let (commands, rx) = mpsc::channel(16);
        let view = GlobeView::new(
            HeadlessRenderer::default(),
            Arc::new(OfflineSource),
            FeedSchedule::default(),
        );
        tokio::spawn(view.run(rx, std::future::pending()));

        let feeds = FeedClient::new(&FeedConfig::default()).unwrap();
        control_routes(AppState { commands, feeds })
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_status_reports_mounted_view() {
        let response = app()
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let status = body_json(response).await;
        assert_eq!(status["mounted"], true);
        assert_eq!(status["layers"].as_array().unwrap().len(), 5);
        assert_eq!(status["density"], "sparse");
    }

    #[tokio::test]
    async fn test_mode_change() {
        let response = app()
            .oneshot(json_request("PUT", "/effects/mode", serde_json::json!({ "mode": "thermal" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let status = body_json(response).await;
        assert_eq!(status["effects"]["activeMode"], "thermal");
    }

    #[tokio::test]
    async fn test_unknown_values_rejected() {
        let app = app();

        let response = app
            .clone()
            .oneshot(json_request("PUT", "/layers/ships", serde_json::json!({ "visible": false })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(json_request("PUT", "/effects/mode", serde_json::json!({ "mode": "xray" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(json_request("PUT", "/city", serde_json::json!({ "city": "atlantis" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_layer_toggle() {
        let response = app()
            .oneshot(json_request("PUT", "/layers/cctv", serde_json::json!({ "visible": false })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let status = body_json(response).await;
        let cameras = status["layers"]
            .as_array()
            .unwrap()
            .iter()
            .find(|l| l["layer"] == "cameras")
            .unwrap()
            .clone();
        assert_eq!(cameras["visible"], false);
    }

    #[tokio::test]
    async fn test_camera_detail_without_selection() {
        let response = app()
            .oneshot(Request::get("/camera/detail").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_closed_view_is_unavailable() {
        let (commands, rx) = mpsc::channel(1);
        drop(rx);
        let feeds = FeedClient::new(&FeedConfig::default()).unwrap();
        let app = control_routes(AppState { commands, feeds });

        let response = app
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
