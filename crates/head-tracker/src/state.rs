//! Published tracker state
//!
//! The capture loop is the only writer. Each iteration builds a complete
//! [`Snapshot`] and swaps it in under one lock, so a reader always sees a
//! direction, action and frame that came from the same iteration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camera_capture::VideoFrame;
use detection::Detection;
use serde::{Deserialize, Serialize};

use crate::{Action, Direction, GazeReading};

/// Control signal as seen by consumers
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlState {
    pub direction: Direction,
    pub action: Action,
    pub confidence: f32,
    /// Diagnostic labels, one per raw detection
    pub detections: Vec<String>,
}

/// One capture iteration's complete output
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub control: ControlState,
    /// Frame the control signal was derived from, as captured (not mirrored)
    pub frame: Option<Arc<VideoFrame>>,
    /// Raw detections behind `control`
    pub raw_detections: Vec<Detection>,
    /// Iterations published since the tracker started
    pub sequence: u64,
    /// Published iterations per second over the last full second
    pub fps: f32,
    pub gaze: Option<GazeReading>,
}

/// Single-slot holder for the latest snapshot
#[derive(Debug, Default)]
pub(crate) struct SnapshotCell {
    current: Mutex<Arc<Snapshot>>,
}

impl SnapshotCell {
    fn lock(&self) -> MutexGuard<'_, Arc<Snapshot>> {
        // A panicking writer never leaves a half-written snapshot behind: the
        // value is swapped whole.
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn load(&self) -> Arc<Snapshot> {
        Arc::clone(&self.lock())
    }

    /// Replace the snapshot unless `running` was cleared.
    ///
    /// The flag is checked under the lock so a stopped run can never publish
    /// after `reset`.
    pub(crate) fn publish_if(&self, running: &AtomicBool, snapshot: Snapshot) -> bool {
        let mut current = self.lock();
        if !running.load(Ordering::Acquire) {
            return false;
        }
        *current = Arc::new(snapshot);
        true
    }

    pub(crate) fn reset(&self) {
        *self.lock() = Arc::new(Snapshot::default());
    }
}

/// Read handle on a tracker's published state.
///
/// Cheap to clone; hand one to every consumer.
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    cell: Arc<SnapshotCell>,
    mirror_display: bool,
}

impl SnapshotReader {
    pub(crate) fn new(cell: Arc<SnapshotCell>, mirror_display: bool) -> Self {
        Self {
            cell,
            mirror_display,
        }
    }

    /// The complete latest snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.cell.load()
    }

    /// Current control signal
    pub fn get_state(&self) -> ControlState {
        self.cell.load().control.clone()
    }

    /// Latest frame, flipped for display when mirroring is on
    pub fn get_frame(&self) -> Option<VideoFrame> {
        let frame = self.cell.load().frame.clone()?;
        if self.mirror_display {
            Some(frame.flip_horizontal())
        } else {
            Some(VideoFrame::clone(&frame))
        }
    }
}
