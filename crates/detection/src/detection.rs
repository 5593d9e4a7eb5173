//! Detection results

use serde::{Deserialize, Serialize};

use crate::DetectionClass;

/// Axis-aligned box in frame pixels (top-left origin)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Build from center / size as emitted by YOLO heads
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(cx - width / 2.0, cy - height / 2.0, width, height)
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    /// Intersection over union
    pub fn iou(&self, other: &BBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    /// Mirror across the vertical axis of a frame `frame_width` wide
    pub fn mirrored(&self, frame_width: f32) -> BBox {
        BBox::new(frame_width - self.x - self.width, self.y, self.width, self.height)
    }
}

/// One detection reported by the detector for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Raw model class index
    pub class_id: u32,
    /// Confidence in [0, 1]
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BBox>,
}

impl Detection {
    pub fn new(class_id: u32, confidence: f32) -> Self {
        Self {
            class_id,
            confidence,
            bbox: None,
        }
    }

    pub fn with_bbox(mut self, bbox: BBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    /// Taxonomy class, `None` for indices outside the model's five classes
    pub fn class(&self) -> Option<DetectionClass> {
        DetectionClass::try_from(self.class_id).ok()
    }

    /// Diagnostic label, e.g. `book_left: 87%`
    pub fn label(&self) -> String {
        let name = self.class().map(DetectionClass::as_str).unwrap_or("?");
        format!("{}: {:.0}%", name, self.confidence * 100.0)
    }
}
