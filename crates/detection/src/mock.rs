//! Mock detector (no model)

use camera_capture::VideoFrame;
use tracing::info;

use crate::{Detection, DetectionError, ObjectDetector};

/// Returns the same detections for every frame, filtered by the threshold
#[derive(Debug, Clone, Default)]
pub struct MockDetector {
    detections: Vec<Detection>,
}

impl MockDetector {
    pub fn new(detections: Vec<Detection>) -> Self {
        info!("Creating mock detector with {} fixed detection(s)", detections.len());
        Self { detections }
    }
}

impl ObjectDetector for MockDetector {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn detect(
        &self,
        _frame: &VideoFrame,
        confidence_threshold: f32,
        _inference_size: u32,
    ) -> Result<Vec<Detection>, DetectionError> {
        Ok(self
            .detections
            .iter()
            .filter(|d| d.confidence >= confidence_threshold)
            .cloned()
            .collect())
    }
}
