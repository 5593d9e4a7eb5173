//! Start / stop routes

use std::sync::Arc;

use axum::{extract::State, Json};
use head_tracker::TrackerError;
use serde::Serialize;
use tracing::{error, info};

use crate::AppState;

/// Response for the control endpoints
#[derive(Debug, Serialize, PartialEq)]
pub struct ControlResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ControlResponse {
    fn status(status: &'static str) -> Self {
        Self {
            status,
            message: None,
        }
    }

    fn error(message: String) -> Self {
        Self {
            status: "error",
            message: Some(message),
        }
    }
}

/// Start the tracker and a fresh drive session
pub async fn start(State(state): State<Arc<AppState>>) -> Json<ControlResponse> {
    if state.tracker.is_running() {
        return Json(ControlResponse::status("already running"));
    }

    // Opening the camera blocks
    let starting = Arc::clone(&state);
    let result = match tokio::task::spawn_blocking(move || starting.tracker.start()).await {
        Ok(result) => result,
        Err(e) => {
            error!("Tracker start task failed: {}", e);
            return Json(ControlResponse::error(e.to_string()));
        }
    };

    match result {
        Ok(()) => {
            let reader = state.tracker.reader();
            state.session.start(move || reader.get_state());
            info!("Game started");
            Json(ControlResponse::status("started"))
        }
        Err(TrackerError::AlreadyRunning) => Json(ControlResponse::status("already running")),
        Err(e) => {
            error!("Could not start tracker: {}", e);
            Json(ControlResponse::error(e.to_string()))
        }
    }
}

/// Stop the tracker and end the drive session
pub async fn stop(State(state): State<Arc<AppState>>) -> Json<ControlResponse> {
    state.session.stop();
    state.tracker.stop();
    info!("Game stopped");
    Json(ControlResponse::status("stopped"))
}
