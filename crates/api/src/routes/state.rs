//! Game state route

use std::sync::Arc;

use axum::{extract::State, Json};
use head_tracker::{ControlState, GazeReading};
use serde::Serialize;

use crate::session::SessionState;
use crate::AppState;

/// Response for `GET /state`
#[derive(Debug, Serialize)]
pub struct StateResponse {
    #[serde(flatten)]
    pub control: ControlState,
    #[serde(flatten)]
    pub session: SessionState,
    pub running: bool,
    pub fps: f32,
    pub sequence: u64,
    /// True unless gaze gating is on and the user looks away
    pub looking_at_screen: bool,
    pub gaze: Option<GazeReading>,
}

/// Current control signal and drive session
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<StateResponse> {
    let snapshot = state.tracker.reader().snapshot();

    Json(StateResponse {
        control: snapshot.control.clone(),
        session: state.session.state(),
        running: state.tracker.is_running(),
        fps: snapshot.fps,
        sequence: snapshot.sequence,
        looking_at_screen: snapshot.gaze.map_or(true, |g| g.looking_at_screen()),
        gaze: snapshot.gaze,
    })
}
