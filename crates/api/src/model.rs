//! Model discovery and detector construction

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use detection::{MockDetector, ObjectDetector};
use head_tracker::{DetectorFaceLocator, FaceLocator};
use tracing::{info, warn};

use crate::config::{GazeConfig, ModelConfig};
use crate::ApiError;

/// Newest `train*` run under `runs_dir` that holds a usable export.
///
/// Runs are ordered by modification time, newest first; within a run
/// `weights/best.onnx` is preferred over `weights/last.onnx`.
pub fn find_latest_model(runs_dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(runs_dir).ok()?;

    let mut runs: Vec<(SystemTime, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("train"))
        .filter_map(|entry| {
            let metadata = entry.metadata().ok()?;
            if !metadata.is_dir() {
                return None;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            Some((modified, entry.path()))
        })
        .collect();
    runs.sort_by(|a, b| b.0.cmp(&a.0));

    runs.into_iter().find_map(|(_, run)| {
        ["best.onnx", "last.onnx"]
            .iter()
            .map(|name| run.join("weights").join(name))
            .find(|candidate| candidate.is_file())
    })
}

/// Resolve the model to load: the configured path, else the newest run
pub fn resolve_model_path(config: &ModelConfig) -> Option<PathBuf> {
    if let Some(path) = &config.path {
        return Some(path.clone());
    }
    config
        .runs_dirs
        .iter()
        .find_map(|dir| find_latest_model(dir))
}

/// Build the detector used by the tracker.
///
/// A configured path that does not exist is an error. When nothing is
/// configured and discovery finds no model, a detection-free mock is used so
/// the rest of the pipeline still runs.
pub fn build_detector(config: &ModelConfig) -> Result<Arc<dyn ObjectDetector>, ApiError> {
    if let Some(path) = &config.path {
        if !path.is_file() {
            return Err(ApiError::ModelNotFound(path.clone()));
        }
    }

    let Some(path) = resolve_model_path(config) else {
        warn!(
            "No trained model found in {:?}, falling back to mock detector",
            config.runs_dirs
        );
        return Ok(Arc::new(MockDetector::default()));
    };

    load_model(&path)
}

/// Build the face locator behind gaze gating.
///
/// Gaze gating needs an explicit face/eye model that exists on disk.
pub fn build_face_locator(config: &GazeConfig) -> Result<Arc<dyn FaceLocator>, ApiError> {
    let Some(path) = &config.model else {
        return Err(ApiError::InvalidConfig(
            "tracker.gaze_gating requires gaze.model".into(),
        ));
    };
    if !path.is_file() {
        return Err(ApiError::ModelNotFound(path.clone()));
    }

    let locator = DetectorFaceLocator::new(load_model(path)?)
        .with_classes(config.face_class, config.eye_class)
        .with_thresholds(config.confidence_threshold, config.inference_size);
    Ok(Arc::new(locator))
}

#[cfg(feature = "onnx")]
fn load_model(path: &Path) -> Result<Arc<dyn ObjectDetector>, ApiError> {
    info!("Loading model {}", path.display());
    let detector = detection::OnnxDetector::load(path)?;
    Ok(Arc::new(detector))
}

#[cfg(not(feature = "onnx"))]
fn load_model(path: &Path) -> Result<Arc<dyn ObjectDetector>, ApiError> {
    info!("Found model {}", path.display());
    warn!("Built without the `onnx` feature, falling back to mock detector");
    Ok(Arc::new(MockDetector::default()))
}
