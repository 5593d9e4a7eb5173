//! Object Detection Adapter
//!
//! Wraps an external object-detection capability behind [`ObjectDetector`]:
//! given a frame, a confidence floor and an inference resolution, return the
//! labeled, scored detections for that frame.

pub mod class;
pub mod detection;
pub mod mock;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod postprocess;
pub mod preprocess;

pub use class::{ClassGroup, DetectionClass};
pub use detection::{BBox, Detection};
pub use mock::MockDetector;
#[cfg(feature = "onnx")]
pub use onnx::OnnxDetector;

use camera_capture::VideoFrame;
use thiserror::Error;
use tracing::warn;

/// Detection error types
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid output shape: expected {expected}, got {actual}")]
    InvalidOutputShape { expected: String, actual: String },

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),
}

/// An object-detection capability.
///
/// Implementations only report detections at or above `confidence_threshold`
/// and rescale the frame to `inference_size` before running the model.
pub trait ObjectDetector: Send + Sync {
    /// Backend identifier
    fn name(&self) -> &'static str;

    /// Run detection on a frame
    fn detect(
        &self,
        frame: &VideoFrame,
        confidence_threshold: f32,
        inference_size: u32,
    ) -> Result<Vec<Detection>, DetectionError>;
}

/// Run `detector`, turning any failure into an empty detection set.
///
/// Capture must never stop because of a detector fault.
pub fn detect_or_empty(
    detector: &dyn ObjectDetector,
    frame: &VideoFrame,
    confidence_threshold: f32,
    inference_size: u32,
) -> Vec<Detection> {
    match detector.detect(frame, confidence_threshold, inference_size) {
        Ok(detections) => detections,
        Err(e) => {
            warn!("Detector {} failed on frame {}: {}", detector.name(), frame.sequence, e);
            Vec::new()
        }
    }
}
