//! Head Tracker
//!
//! Real-time perception-to-control pipeline:
//! - Background capture loop reading the webcam
//! - Object detection on every frame
//! - Reduction of raw detections into a direction / action control signal
//! - Optional gaze gating of acceleration
//! - Thread-safe snapshot polled by consumers at their own cadence

pub mod config;
pub mod gaze;
pub mod reducer;
pub mod state;
pub mod tracker;

pub use config::TrackerConfig;
pub use gaze::{classify_gaze, DetectorFaceLocator, FaceLocator, FaceObservation, GazeDirection, GazeReading};
pub use reducer::{reduce, Action, Direction, Reduction};
pub use state::{ControlState, Snapshot, SnapshotReader};
pub use tracker::HeadTracker;

use camera_capture::CameraError;
use thiserror::Error;

/// Tracker error types
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(#[source] CameraError),

    #[error("Tracker already running")]
    AlreadyRunning,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to spawn capture thread: {0}")]
    Spawn(String),
}
