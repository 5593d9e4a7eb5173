//! NewDriver API Server
//!
//! HTTP front end for the head-controlled driving game: control state,
//! MJPEG preview, start/stop of the tracker and drive session.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use camera_capture::{CameraError, CameraProvider, SyntheticCamera};
use detection::DetectionError;
use head_tracker::{HeadTracker, TrackerError};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

pub mod config;
pub mod model;
mod routes;
pub mod session;

pub use crate::config::{AppConfig, CameraSource};
pub use session::{DriveSession, SessionState};

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Model not found: {0}")]
    ModelNotFound(PathBuf),

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error("Metrics exporter: {0}")]
    Metrics(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state shared across handlers
pub struct AppState {
    pub tracker: HeadTracker,
    pub session: DriveSession,
    pub config: AppConfig,
    /// Prometheus render handle, when metrics are enabled
    pub metrics: Option<PrometheusHandle>,
    pub version: String,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(tracker: HeadTracker, config: AppConfig) -> Self {
        Self {
            session: DriveSession::new(config.session.tick_hz),
            tracker,
            config,
            metrics: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub tracker_running: bool,
    pub game_active: bool,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/state", get(routes::state::get_state))
        .route("/video_feed", get(routes::video::video_feed))
        .route("/start", post(routes::control::start))
        .route("/stop", post(routes::control::stop))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        tracker_running: state.tracker.is_running(),
        game_active: state.session.state().game_active,
    })
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Initialize logging
pub fn init_logging(config: &crate::config::LoggingConfig) -> Result<(), ApiError> {
    let level: Level = config.level.parse().map_err(|_| {
        ApiError::InvalidConfig(format!("unknown log level {:?}", config.level))
    })?;

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_names(true);

    let result = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.map_err(|e| ApiError::InvalidConfig(format!("tracing subscriber: {e}")))
}

/// Camera backend selected by configuration
pub fn build_camera(source: CameraSource) -> Result<Arc<dyn CameraProvider>, ApiError> {
    match source {
        CameraSource::Synthetic => Ok(Arc::new(SyntheticCamera::new())),
        #[cfg(feature = "v4l2")]
        CameraSource::V4l2 => Ok(Arc::new(camera_capture::V4l2Camera)),
        #[cfg(not(feature = "v4l2"))]
        CameraSource::V4l2 => Err(ApiError::InvalidConfig(
            "camera.source = \"v4l2\" requires the `v4l2` feature".into(),
        )),
    }
}

/// Build the application state from configuration
pub fn build_state(config: AppConfig) -> Result<AppState, ApiError> {
    let camera = build_camera(config.camera.source)?;
    let detector = model::build_detector(&config.model)?;
    let mut tracker = HeadTracker::new(config.tracker.clone(), camera, detector)?;
    if config.tracker.gaze_gating {
        let locator = model::build_face_locator(&config.gaze)?;
        info!("Gaze gating enabled with face locator {}", locator.name());
        tracker = tracker.with_face_locator(locator);
    }
    Ok(AppState::new(tracker, config))
}

/// Run the server
pub async fn run_server(config: AppConfig) -> Result<(), ApiError> {
    let addr = config.server.bind_addr.clone();
    let metrics_enabled = config.server.metrics;

    let mut state = build_state(config)?;
    if metrics_enabled {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| ApiError::Metrics(e.to_string()))?;
        state = state.with_metrics(handle);
    }

    let state = Arc::new(state);
    let app = create_router(Arc::clone(&state));

    info!("Starting API server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.session.stop();
    state.tracker.stop_and_wait();
    info!("Server stopped, camera released");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
