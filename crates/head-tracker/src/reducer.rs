//! Signal reduction
//!
//! Turns one frame's raw detections into exactly one control signal. The
//! reduction is a pure function of the current frame: there is no memory
//! across frames.

use detection::{ClassGroup, Detection, DetectionClass};
use serde::{Deserialize, Serialize};

/// Steering direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Left,
    #[default]
    Center,
    Right,
}

impl Direction {
    /// Swap LEFT and RIGHT; CENTER is a fixed point
    pub fn mirrored(self) -> Self {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::Center => Direction::Center,
        }
    }

    fn from_lateral(class: DetectionClass) -> Option<Self> {
        match class {
            DetectionClass::BookLeft => Some(Direction::Left),
            DetectionClass::BookCenter => Some(Direction::Center),
            DetectionClass::BookRight => Some(Direction::Right),
            DetectionClass::Serious | DetectionClass::Smiling => None,
        }
    }
}

/// Throttle action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Accelerate,
    #[default]
    Stop,
}

/// Control signal derived from one frame
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Reduction {
    pub direction: Direction,
    pub action: Action,
    /// Max of the confidences behind `direction` and `action`
    pub confidence: f32,
    /// One `"<class>: <NN%>"` entry per raw detection, in detection order
    pub labels: Vec<String>,
}

/// Per-class maximum confidence, in first-appearance order
#[derive(Debug, Default)]
struct ClassMaxima {
    entries: Vec<(DetectionClass, f32)>,
}

impl ClassMaxima {
    fn record(&mut self, class: DetectionClass, confidence: f32) {
        match self.entries.iter_mut().find(|(c, _)| *c == class) {
            Some((_, best)) => {
                if confidence > *best {
                    *best = confidence;
                }
            }
            None => self.entries.push((class, confidence)),
        }
    }

    fn get(&self, class: DetectionClass) -> Option<f32> {
        self.entries
            .iter()
            .find(|(c, _)| *c == class)
            .map(|(_, conf)| *conf)
    }

    fn iter(&self) -> impl Iterator<Item = &(DetectionClass, f32)> {
        self.entries.iter()
    }
}

/// Reduce a frame's detections into a control signal.
///
/// Lateral classes pick the direction: the first class whose maximum
/// strictly exceeds the running best wins, so among equal maxima the class
/// that appeared first is kept. Facial classes pick the action: ACCELERATE
/// only when the smiling maximum strictly exceeds the serious maximum.
pub fn reduce(detections: &[Detection], mirror: bool) -> Reduction {
    let mut lateral = ClassMaxima::default();
    let mut facial = ClassMaxima::default();

    for detection in detections {
        let Some(class) = detection.class() else {
            continue;
        };
        match class.group() {
            ClassGroup::Lateral => lateral.record(class, detection.confidence),
            ClassGroup::Facial => facial.record(class, detection.confidence),
        }
    }

    let mut direction = Direction::Center;
    let mut lateral_best = 0.0f32;
    for &(class, confidence) in lateral.iter() {
        if confidence > lateral_best {
            lateral_best = confidence;
            if let Some(mapped) = Direction::from_lateral(class) {
                direction = mapped;
            }
        }
    }

    if mirror {
        direction = direction.mirrored();
    }

    let (action, facial_confidence) = match (
        facial.get(DetectionClass::Smiling),
        facial.get(DetectionClass::Serious),
    ) {
        (Some(smiling), serious) => {
            let serious = serious.unwrap_or(0.0);
            if smiling > serious {
                (Action::Accelerate, smiling)
            } else {
                (Action::Stop, serious)
            }
        }
        (None, Some(serious)) => (Action::Stop, serious),
        (None, None) => (Action::Stop, 0.0),
    };

    Reduction {
        direction,
        action,
        confidence: lateral_best.max(facial_confidence),
        labels: detections.iter().map(Detection::label).collect(),
    }
}
