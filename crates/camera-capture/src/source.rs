//! Capture source traits

use crate::{CameraConfig, CameraError, VideoFrame};

/// An opened camera. Dropping it releases the device.
pub trait FrameSource: Send {
    /// Read the next frame, blocking until one is available
    fn read_frame(&mut self) -> Result<VideoFrame, CameraError>;
}

/// Opens camera devices
pub trait CameraProvider: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Open the device described by `config`
    fn open(&self, config: &CameraConfig) -> Result<Box<dyn FrameSource>, CameraError>;
}

/// Current wall-clock time in nanoseconds
pub(crate) fn now_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
