use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use globe_scene::{DensityMode, GlobeView, HeadlessRenderer};
use track_feeds::{FeedClient, FeedConfig};

mod routes;

const COMMAND_CHANNEL_CAPACITY: usize = 64;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| {
                "worldview_gateway=debug,globe_scene=debug,track_feeds=info,info".into()
            }),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = FeedConfig::from_env();
    let feeds = FeedClient::new(&config)?;
    tracing::info!("   Feed backend: {}", feeds.base_url());

    let density = match std::env::var("WORLDVIEW_DENSITY") {
        Ok(value) => value.parse::<DensityMode>()?,
        Err(_) => DensityMode::default(),
    };

    // No GPU host attached to this process; the headless renderer keeps
    // the full scene in memory for the control surface.
    let view = GlobeView::new(HeadlessRenderer::default(), Arc::new(feeds.clone()), config.schedule)
        .with_density(density);

    let (commands, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let state = routes::AppState { commands, feeds };

    let api_routes = Router::new()
        .route("/health", get(routes::health))
        .nest("/api/v1", routes::control_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let app = match std::env::var("WORLDVIEW_UI_DIR") {
        Ok(dir) if std::path::Path::new(&dir).exists() => {
            tracing::info!("   Serving UI from {}", dir);
            api_routes.fallback_service(ServeDir::new(dir))
        }
        _ => api_routes,
    };

    let port = std::env::var("WORLDVIEW_GATEWAY_PORT")
        .or_else(|_| std::env::var("PORT"))
        .unwrap_or_else(|_| "18610".to_string());
    let addr = format!("0.0.0.0:{}", port);

    tracing::info!("WorldView gateway starting on {}", addr);
    tracing::info!("   Density: {:?}", density);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };
    view.run(command_rx, shutdown).await;

    server.abort();
    tracing::info!("WorldView gateway stopped");
    Ok(())
}
