//! Detection class taxonomy
//!
//! The model is trained on five classes. Three encode the book's lateral
//! position, two encode the facial expression; every class belongs to
//! exactly one of these groups.

use serde::{Deserialize, Serialize};

/// Class group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassGroup {
    /// Book tilted left / held center / tilted right
    Lateral,
    /// Serious / smiling expression
    Facial,
}

/// Model class, keyed by the model's output index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionClass {
    Serious,
    BookRight,
    BookCenter,
    BookLeft,
    Smiling,
}

impl DetectionClass {
    /// All classes in model index order
    pub const ALL: [DetectionClass; 5] = [
        DetectionClass::Serious,
        DetectionClass::BookRight,
        DetectionClass::BookCenter,
        DetectionClass::BookLeft,
        DetectionClass::Smiling,
    ];

    /// Model output index
    pub fn class_id(self) -> u32 {
        match self {
            DetectionClass::Serious => 0,
            DetectionClass::BookRight => 1,
            DetectionClass::BookCenter => 2,
            DetectionClass::BookLeft => 3,
            DetectionClass::Smiling => 4,
        }
    }

    /// Label used in diagnostics
    pub fn as_str(self) -> &'static str {
        match self {
            DetectionClass::Serious => "serious",
            DetectionClass::BookRight => "book_right",
            DetectionClass::BookCenter => "book_center",
            DetectionClass::BookLeft => "book_left",
            DetectionClass::Smiling => "smiling",
        }
    }

    pub fn group(self) -> ClassGroup {
        match self {
            DetectionClass::BookLeft | DetectionClass::BookCenter | DetectionClass::BookRight => {
                ClassGroup::Lateral
            }
            DetectionClass::Serious | DetectionClass::Smiling => ClassGroup::Facial,
        }
    }
}

impl TryFrom<u32> for DetectionClass {
    type Error = u32;

    fn try_from(class_id: u32) -> Result<Self, Self::Error> {
        match class_id {
            0 => Ok(DetectionClass::Serious),
            1 => Ok(DetectionClass::BookRight),
            2 => Ok(DetectionClass::BookCenter),
            3 => Ok(DetectionClass::BookLeft),
            4 => Ok(DetectionClass::Smiling),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for DetectionClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
