//! YOLO output decoding and non-maximum suppression

use ndarray::{ArrayViewD, Axis, Ix2};

use crate::{BBox, Detection, DetectionError};

/// IoU above which a lower-scored box of the same class is suppressed
pub const NMS_IOU_THRESHOLD: f32 = 0.45;

/// Decode a YOLOv8-style head output of shape `[1, 4 + classes, anchors]`.
///
/// Each anchor column holds `cx, cy, w, h` followed by one score per class;
/// the best class is kept when its score reaches `confidence_threshold`.
/// Boxes stay in model-input pixels.
pub fn decode_yolo(
    output: ArrayViewD<'_, f32>,
    confidence_threshold: f32,
) -> Result<Vec<Detection>, DetectionError> {
    let shape = output.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
        return Err(DetectionError::InvalidOutputShape {
            expected: "[1, 4 + classes, anchors]".into(),
            actual: format!("{:?}", shape),
        });
    }

    let rows = output
        .index_axis(Axis(0), 0)
        .into_dimensionality::<Ix2>()
        .map_err(|e| DetectionError::Inference(e.to_string()))?;
    let num_classes = shape[1] - 4;
    let mut detections = Vec::new();

    for anchor in rows.axis_iter(Axis(1)) {
        let mut best_class = 0usize;
        let mut best_score = f32::MIN;
        for c in 0..num_classes {
            let score = anchor[4 + c];
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }

        if best_score < confidence_threshold {
            continue;
        }

        let bbox = BBox::from_center(anchor[0], anchor[1], anchor[2], anchor[3]);
        detections.push(Detection::new(best_class as u32, best_score).with_bbox(bbox));
    }

    Ok(non_max_suppression(detections, NMS_IOU_THRESHOLD))
}

/// Per-class greedy NMS. Output is ordered by descending confidence.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id
                && match (&k.bbox, &candidate.bbox) {
                    (Some(a), Some(b)) => a.iou(b) > iou_threshold,
                    _ => false,
                }
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
