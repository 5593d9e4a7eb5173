//! Application configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! `newdriver.toml` (or an explicit file), then `NEWDRIVER__*` environment
//! variables, e.g. `NEWDRIVER__TRACKER__MIRROR_CONTROLS=false`.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use head_tracker::TrackerConfig;
use serde::{Deserialize, Serialize};

use crate::ApiError;

/// Top-level configuration for the `newdriver` binary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub camera: CameraSettings,
    pub model: ModelConfig,
    pub tracker: TrackerConfig,
    pub gaze: GazeConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// JPEG quality of the preview stream (1-100)
    pub jpeg_quality: u8,
    /// Upper bound on preview frames per second
    pub stream_fps: u32,
    /// Expose Prometheus metrics at `/metrics`
    pub metrics: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".into(),
            jpeg_quality: 80,
            stream_fps: 30,
            metrics: true,
        }
    }
}

/// Which camera backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraSource {
    Synthetic,
    V4l2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub source: CameraSource,
}

impl Default for CameraSettings {
    fn default() -> Self {
        let source = if cfg!(feature = "v4l2") {
            CameraSource::V4l2
        } else {
            CameraSource::Synthetic
        };
        Self { source }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Explicit model file; skips discovery when set
    pub path: Option<PathBuf>,
    /// Training output directories searched for the newest run
    pub runs_dirs: Vec<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: None,
            runs_dirs: vec![
                PathBuf::from("training/runs/detect"),
                PathBuf::from("scripts/runs/detect"),
            ],
        }
    }
}

/// Face/eye model used when `tracker.gaze_gating` is on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeConfig {
    /// Face/eye detection model; required for gaze gating
    pub model: Option<PathBuf>,
    pub face_class: u32,
    pub eye_class: u32,
    pub confidence_threshold: f32,
    pub inference_size: u32,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            model: None,
            face_class: 0,
            eye_class: 1,
            confidence_threshold: 0.3,
            inference_size: 320,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Drive session updates per second
    pub tick_hz: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { tick_hz: 30 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration.
    ///
    /// `path` must exist when given; otherwise `newdriver.toml` in the working
    /// directory is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self, ApiError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("newdriver").required(false),
        };

        let config: AppConfig = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(file)
            .add_source(
                Environment::with_prefix("NEWDRIVER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        self.tracker.validate()?;
        if !(1..=100).contains(&self.server.jpeg_quality) {
            return Err(ApiError::InvalidConfig(format!(
                "server.jpeg_quality must be within 1-100, got {}",
                self.server.jpeg_quality
            )));
        }
        if !(0.0..=1.0).contains(&self.gaze.confidence_threshold) || self.gaze.inference_size == 0 {
            return Err(ApiError::InvalidConfig(
                "gaze.confidence_threshold must be within 0-1 and gaze.inference_size non-zero".into(),
            ));
        }
        if self.server.stream_fps == 0 || self.session.tick_hz == 0 {
            return Err(ApiError::InvalidConfig(
                "server.stream_fps and session.tick_hz must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
