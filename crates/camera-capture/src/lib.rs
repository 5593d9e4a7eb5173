//! Camera Capture Library
//!
//! Opens a webcam and produces decoded RGB frames for the head tracker.
//! Supports:
//! - V4L2 devices (`/dev/videoN`, MJPEG / YUYV / RGB24) behind the `v4l2` feature
//! - Synthetic frames for demos and tests

pub mod frame;
pub mod source;
pub mod synthetic;
#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use frame::{PixelFormat, VideoFrame};
pub use source::{CameraProvider, FrameSource};
pub use synthetic::SyntheticCamera;
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Camera;

use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera {index}: {reason}")]
    Open { index: u32, reason: String },

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Streaming error: {0}")]
    Stream(String),

    #[error("Frame decode failed: {0}")]
    Decode(String),

    #[error("Capture timeout")]
    Timeout,

    #[error("Camera closed")]
    Closed,
}

/// Camera configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraConfig {
    /// Device index (`0` is `/dev/video0`)
    pub index: u32,
    /// Requested capture width
    pub width: u32,
    /// Requested capture height
    pub height: u32,
    /// Requested frame rate
    pub fps: u32,
    /// Driver-side buffer count. One buffer keeps the processed frame the newest one.
    pub buffer_count: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: 640,
            height: 480,
            fps: 30,
            buffer_count: 1,
        }
    }
}

impl CameraConfig {
    /// Device node path for this index
    pub fn device_path(&self) -> String {
        format!("/dev/video{}", self.index)
    }
}
