//! ONNX Runtime backend for YOLO exports

use std::path::Path;

use camera_capture::VideoFrame;
use ort::session::{builder::GraphOptimizationLevel, Session};
use tracing::{debug, error, info};

use crate::postprocess::decode_yolo;
use crate::preprocess::letterbox;
use crate::{Detection, DetectionError, ObjectDetector};

/// YOLO detector running on ONNX Runtime
pub struct OnnxDetector {
    session: Session,
}

impl OnnxDetector {
    /// Load an exported model from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DetectionError> {
        let path = path.as_ref();
        info!("Loading detection model from {}", path.display());

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| {
                error!("Failed to load detection model: {}", e);
                DetectionError::ModelLoad(e.to_string())
            })?;

        Ok(Self { session })
    }
}

impl ObjectDetector for OnnxDetector {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn detect(
        &self,
        frame: &VideoFrame,
        confidence_threshold: f32,
        inference_size: u32,
    ) -> Result<Vec<Detection>, DetectionError> {
        let start = std::time::Instant::now();

        // 1. Letterbox to the inference resolution
        let (input, transform) = letterbox(frame, inference_size)?;

        // 2. Inference
        let inputs = ort::inputs![input].map_err(|e| DetectionError::Inference(e.to_string()))?;
        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| DetectionError::Inference(e.to_string()))?;
        let output = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectionError::Inference(e.to_string()))?;

        // 3. Decode, then map boxes back onto the frame
        let detections = decode_yolo(output, confidence_threshold)?
            .into_iter()
            .map(|mut d| {
                d.bbox = d.bbox.map(|b| transform.to_frame(b));
                d
            })
            .collect::<Vec<_>>();

        debug!(
            "Inference on frame {}: {} detection(s) in {}ms",
            frame.sequence,
            detections.len(),
            start.elapsed().as_millis()
        );
        Ok(detections)
    }
}
