//! Coarse gaze estimation
//!
//! Decides whether the user is looking at the screen from where the eyes sit
//! inside the face box. Face and eye localization sits behind
//! [`FaceLocator`]; [`DetectorFaceLocator`] backs it with an object detector
//! trained on face and eye classes.

use std::sync::Arc;

use camera_capture::VideoFrame;
use detection::{BBox, Detection, DetectionError, ObjectDetector};
use serde::{Deserialize, Serialize};

/// Eye-centre ratio below which the gaze counts as LEFT
const LEFT_RATIO: f32 = 0.35;
/// Eye-centre ratio above which the gaze counts as RIGHT
const RIGHT_RATIO: f32 = 0.65;
/// Ratio reported when no usable eye pair was found
const NEUTRAL_RATIO: f32 = 0.5;

/// A located face and the eyes found inside it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    /// Face box in frame pixels
    pub face: BBox,
    /// Eye boxes relative to the face box origin
    pub eyes: Vec<BBox>,
}

/// Coarse gaze direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GazeDirection {
    Left,
    Center,
    Right,
    /// Face found but fewer than two eyes (closed or turned away)
    Averted,
    NoFace,
}

/// Gaze estimate for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeReading {
    pub direction: GazeDirection,
    /// Mean eye-centre x divided by face width
    pub ratio: f32,
    pub eyes_open: bool,
}

impl GazeReading {
    pub fn looking_at_screen(&self) -> bool {
        self.direction == GazeDirection::Center && self.eyes_open
    }
}

/// Locates a face and its eyes in a frame
pub trait FaceLocator: Send + Sync {
    fn name(&self) -> &'static str;

    /// First face in the frame, `None` when there is no face
    fn locate(&self, frame: &VideoFrame) -> Result<Option<FaceObservation>, DetectionError>;
}

/// [`FaceLocator`] over a face/eye object-detection model
pub struct DetectorFaceLocator {
    detector: Arc<dyn ObjectDetector>,
    face_class: u32,
    eye_class: u32,
    confidence_threshold: f32,
    inference_size: u32,
}

impl DetectorFaceLocator {
    pub fn new(detector: Arc<dyn ObjectDetector>) -> Self {
        Self {
            detector,
            face_class: 0,
            eye_class: 1,
            confidence_threshold: 0.3,
            inference_size: 320,
        }
    }

    pub fn with_classes(mut self, face_class: u32, eye_class: u32) -> Self {
        self.face_class = face_class;
        self.eye_class = eye_class;
        self
    }

    pub fn with_thresholds(mut self, confidence_threshold: f32, inference_size: u32) -> Self {
        self.confidence_threshold = confidence_threshold;
        self.inference_size = inference_size;
        self
    }

    /// Highest-confidence face that carries a box
    fn best_face<'a>(&self, detections: &'a [Detection]) -> Option<(&'a Detection, BBox)> {
        detections
            .iter()
            .filter(|d| d.class_id == self.face_class)
            .filter_map(|d| d.bbox.map(|bbox| (d, bbox)))
            .max_by(|(a, _), (b, _)| a.confidence.total_cmp(&b.confidence))
    }
}

impl FaceLocator for DetectorFaceLocator {
    fn name(&self) -> &'static str {
        self.detector.name()
    }

    fn locate(&self, frame: &VideoFrame) -> Result<Option<FaceObservation>, DetectionError> {
        let detections = self
            .detector
            .detect(frame, self.confidence_threshold, self.inference_size)?;
        let Some((_, face)) = self.best_face(&detections) else {
            return Ok(None);
        };

        let mut eyes: Vec<&Detection> = detections
            .iter()
            .filter(|d| d.class_id == self.eye_class)
            .filter(|d| {
                d.bbox.is_some_and(|eye| {
                    let (cx, cy) = (eye.center_x(), eye.y + eye.height / 2.0);
                    cx >= face.x && cx <= face.x + face.width && cy >= face.y && cy <= face.y + face.height
                })
            })
            .collect();
        eyes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let eyes = eyes
            .into_iter()
            .filter_map(|d| d.bbox)
            .map(|eye| BBox::new(eye.x - face.x, eye.y - face.y, eye.width, eye.height))
            .collect();

        Ok(Some(FaceObservation { face, eyes }))
    }
}

/// Classify gaze from a face observation
pub fn classify_gaze(observation: Option<&FaceObservation>) -> GazeReading {
    let Some(observation) = observation else {
        return GazeReading {
            direction: GazeDirection::NoFace,
            ratio: NEUTRAL_RATIO,
            eyes_open: false,
        };
    };

    if observation.eyes.len() < 2 || observation.face.width <= 0.0 {
        return GazeReading {
            direction: GazeDirection::Averted,
            ratio: NEUTRAL_RATIO,
            eyes_open: false,
        };
    }

    let mean_x = observation.eyes[..2]
        .iter()
        .map(|eye| eye.center_x())
        .sum::<f32>()
        / 2.0;
    let ratio = mean_x / observation.face.width;

    let direction = if ratio < LEFT_RATIO {
        GazeDirection::Left
    } else if ratio > RIGHT_RATIO {
        GazeDirection::Right
    } else {
        GazeDirection::Center
    };

    GazeReading {
        direction,
        ratio,
        eyes_open: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use detection::MockDetector;

    fn face_with_eyes(eye_xs: &[f32]) -> FaceObservation {
        FaceObservation {
            face: BBox::new(100.0, 80.0, 200.0, 200.0),
            eyes: eye_xs
                .iter()
                .map(|&x| BBox::new(x, 60.0, 20.0, 12.0))
                .collect(),
        }
    }

    #[test]
    fn test_no_face() {
        let reading = classify_gaze(None);
        assert_eq!(reading.direction, GazeDirection::NoFace);
        assert_eq!(reading.ratio, 0.5);
        assert!(!reading.looking_at_screen());
    }

    #[test]
    fn test_single_eye_is_averted() {
        let reading = classify_gaze(Some(&face_with_eyes(&[50.0])));
        assert_eq!(reading.direction, GazeDirection::Averted);
        assert!(!reading.eyes_open);
    }

    #[test]
    fn test_centered_eyes_look_at_screen() {
        // centres at 60 and 140 -> mean 100 -> ratio 0.5
        let reading = classify_gaze(Some(&face_with_eyes(&[50.0, 130.0])));
        assert_eq!(reading.direction, GazeDirection::Center);
        assert!((reading.ratio - 0.5).abs() < 1e-6);
        assert!(reading.looking_at_screen());
    }

    #[test]
    fn test_shifted_eyes() {
        // centres at 20 and 60 -> ratio 0.2
        let left = classify_gaze(Some(&face_with_eyes(&[10.0, 50.0])));
        assert_eq!(left.direction, GazeDirection::Left);
        assert!(left.eyes_open);
        assert!(!left.looking_at_screen());

        // centres at 150 and 170 -> ratio 0.8
        let right = classify_gaze(Some(&face_with_eyes(&[140.0, 160.0])));
        assert_eq!(right.direction, GazeDirection::Right);
    }

    fn located(detections: Vec<Detection>) -> Option<FaceObservation> {
        let detector = Arc::new(MockDetector::new(detections));
        let frame = VideoFrame::solid(8, 8, [0, 0, 0]);
        DetectorFaceLocator::new(detector).locate(&frame).unwrap()
    }

    #[test]
    fn test_detector_locator_makes_eyes_face_relative() {
        let observation = located(vec![
            Detection::new(0, 0.5).with_bbox(BBox::new(0.0, 0.0, 50.0, 50.0)),
            Detection::new(0, 0.9).with_bbox(BBox::new(100.0, 80.0, 200.0, 200.0)),
            Detection::new(1, 0.6).with_bbox(BBox::new(150.0, 140.0, 20.0, 12.0)),
            Detection::new(1, 0.8).with_bbox(BBox::new(230.0, 140.0, 20.0, 12.0)),
            // outside the chosen face
            Detection::new(1, 0.99).with_bbox(BBox::new(10.0, 10.0, 20.0, 12.0)),
        ])
        .unwrap();

        assert_eq!(observation.face, BBox::new(100.0, 80.0, 200.0, 200.0));
        assert_eq!(
            observation.eyes,
            vec![BBox::new(130.0, 60.0, 20.0, 12.0), BBox::new(50.0, 60.0, 20.0, 12.0)]
        );
        assert!(classify_gaze(Some(&observation)).looking_at_screen());
    }

    #[test]
    fn test_detector_locator_without_face() {
        assert!(located(vec![Detection::new(1, 0.9).with_bbox(BBox::new(0.0, 0.0, 4.0, 4.0))]).is_none());
        // face class without a box cannot anchor the eyes
        assert!(located(vec![Detection::new(0, 0.9)]).is_none());
    }

    #[test]
    fn test_only_first_two_eyes_count() {
        let reading = classify_gaze(Some(&face_with_eyes(&[50.0, 130.0, 0.0])));
        assert_eq!(reading.direction, GazeDirection::Center);
    }
}
