//! Tracker configuration

use camera_capture::CameraConfig;
use serde::{Deserialize, Serialize};

use crate::TrackerError;

/// Tracker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Camera device index
    pub camera_index: u32,

    /// Requested capture resolution
    pub capture_width: u32,
    pub capture_height: u32,

    /// Requested capture frame rate
    pub capture_fps: u32,

    /// Detections below this confidence are not returned by the detector
    pub confidence_threshold: f32,

    /// Square resolution frames are rescaled to before detection
    pub inference_size: u32,

    /// Swap LEFT and RIGHT to compensate for a front-facing camera
    pub mirror_controls: bool,

    /// Flip frames returned by `get_frame` so users see themselves mirrored
    pub mirror_display: bool,

    /// Only accelerate while the user looks at the screen (needs a face locator)
    pub gaze_gating: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            capture_width: 640,
            capture_height: 480,
            capture_fps: 30,
            confidence_threshold: 0.25,
            inference_size: 320,
            mirror_controls: true,
            mirror_display: true,
            gaze_gating: false,
        }
    }
}

impl TrackerConfig {
    /// Smaller capture and inference sizes for slow CPUs
    pub fn low_latency() -> Self {
        Self {
            capture_width: 320,
            capture_height: 240,
            inference_size: 256,
            ..Default::default()
        }
    }

    /// Camera settings derived from this configuration
    pub fn camera_config(&self) -> CameraConfig {
        CameraConfig {
            index: self.camera_index,
            width: self.capture_width,
            height: self.capture_height,
            fps: self.capture_fps,
            buffer_count: 1,
        }
    }

    pub fn validate(&self) -> Result<(), TrackerError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(TrackerError::Config(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.inference_size == 0 || self.inference_size % 32 != 0 {
            return Err(TrackerError::Config(format!(
                "inference_size must be a positive multiple of 32, got {}",
                self.inference_size
            )));
        }
        if self.capture_width == 0 || self.capture_height == 0 {
            return Err(TrackerError::Config("capture resolution must be non-zero".into()));
        }
        Ok(())
    }
}
