//! Synthetic camera for demos and tests
//!
//! Produces a dark background with a bright vertical bar sweeping across the
//! frame, paced to the configured frame rate.

use std::time::{Duration, Instant};
use tracing::info;

use crate::source::now_ns;
use crate::{CameraConfig, CameraError, CameraProvider, FrameSource, VideoFrame};

/// Provider that never touches hardware
#[derive(Debug, Clone, Default)]
pub struct SyntheticCamera {
    /// Return frames as fast as they are read instead of pacing to `fps`
    pub unpaced: bool,
}

impl SyntheticCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider whose sources never sleep between frames
    pub fn unpaced() -> Self {
        Self { unpaced: true }
    }
}

impl CameraProvider for SyntheticCamera {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn open(&self, config: &CameraConfig) -> Result<Box<dyn FrameSource>, CameraError> {
        if config.width == 0 || config.height == 0 {
            return Err(CameraError::Open {
                index: config.index,
                reason: format!("invalid resolution {}x{}", config.width, config.height),
            });
        }

        info!(
            "Synthetic camera {} opened ({}x{} @ {}fps)",
            config.index, config.width, config.height, config.fps
        );

        let interval = if self.unpaced || config.fps == 0 {
            None
        } else {
            Some(Duration::from_secs_f64(1.0 / config.fps as f64))
        };

        Ok(Box::new(SyntheticSource {
            width: config.width,
            height: config.height,
            interval,
            next_due: Instant::now(),
            sequence: 0,
        }))
    }
}

struct SyntheticSource {
    width: u32,
    height: u32,
    interval: Option<Duration>,
    next_due: Instant,
    sequence: u32,
}

impl SyntheticSource {
    fn render(&self) -> Vec<u8> {
        let bar_width = (self.width / 8).max(1);
        let bar_x = (self.sequence * 4) % self.width;
        let mut data = Vec::with_capacity((self.width * self.height * 3) as usize);
        for _y in 0..self.height {
            for x in 0..self.width {
                if x >= bar_x && x < bar_x + bar_width {
                    data.extend_from_slice(&[230, 230, 230]);
                } else {
                    data.extend_from_slice(&[20, 24, 32]);
                }
            }
        }
        data
    }
}

impl FrameSource for SyntheticSource {
    fn read_frame(&mut self) -> Result<VideoFrame, CameraError> {
        if let Some(interval) = self.interval {
            let now = Instant::now();
            if self.next_due > now {
                std::thread::sleep(self.next_due - now);
            }
            self.next_due = Instant::now() + interval;
        }

        self.sequence = self.sequence.wrapping_add(1);
        Ok(VideoFrame::new(
            self.render(),
            self.width,
            self.height,
            now_ns(),
            self.sequence,
        ))
    }
}
