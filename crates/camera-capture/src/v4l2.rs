//! V4L2 webcam source

use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::frame::{decode_mjpeg, yuyv_to_rgb};
use crate::source::now_ns;
use crate::{CameraConfig, CameraError, CameraProvider, FrameSource, PixelFormat, VideoFrame};

/// Opens `/dev/videoN` through libv4l
#[derive(Debug, Clone, Default)]
pub struct V4l2Camera;

impl CameraProvider for V4l2Camera {
    fn name(&self) -> &'static str {
        "v4l2"
    }

    fn open(&self, config: &CameraConfig) -> Result<Box<dyn FrameSource>, CameraError> {
        let open_err = |reason: String| CameraError::Open {
            index: config.index,
            reason,
        };

        let device = Device::new(config.index as usize).map_err(|e| open_err(e.to_string()))?;

        let mut format = device.format().map_err(|e| open_err(e.to_string()))?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = FourCC::new(b"MJPG");
        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(e) => {
                warn!("Failed to set MJPG format on {}: {}", config.device_path(), e);
                device.format().map_err(|e| open_err(e.to_string()))?
            }
        };

        let pixel_format = match &format.fourcc.repr {
            b"MJPG" => PixelFormat::Mjpeg,
            b"YUYV" => PixelFormat::Yuyv,
            b"RGB3" => PixelFormat::Rgb24,
            other => {
                return Err(CameraError::Format(format!(
                    "unsupported pixel format {}",
                    String::from_utf8_lossy(other)
                )))
            }
        };

        if config.fps > 0 {
            if let Err(e) = device.set_params(&Parameters::with_fps(config.fps)) {
                warn!("Failed to set {}fps on {}: {}", config.fps, config.device_path(), e);
            }
        }

        let stream = Stream::with_buffers(&device, Type::VideoCapture, config.buffer_count.max(1))
            .map_err(|e| open_err(e.to_string()))?;

        info!(
            "Camera {} opened ({}x{}, {:?}, {} buffer(s))",
            config.device_path(),
            format.width,
            format.height,
            pixel_format,
            config.buffer_count.max(1)
        );

        Ok(Box::new(V4l2Source {
            stream,
            _device: device,
            width: format.width,
            height: format.height,
            pixel_format,
            sequence: 0,
        }))
    }
}

struct V4l2Source {
    // Field order matters: the stream must be dropped before the device.
    stream: Stream<'static>,
    _device: Device,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    sequence: u32,
}

impl FrameSource for V4l2Source {
    fn read_frame(&mut self) -> Result<VideoFrame, CameraError> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| CameraError::Stream(e.to_string()))?;
        let used = (meta.bytesused as usize).min(buf.len());
        let buf = &buf[..used];

        let mut frame = match self.pixel_format {
            PixelFormat::Mjpeg => decode_mjpeg(buf)?,
            PixelFormat::Yuyv => yuyv_to_rgb(buf, self.width, self.height)?,
            PixelFormat::Rgb24 => {
                let expected = (self.width * self.height * 3) as usize;
                if buf.len() < expected {
                    return Err(CameraError::Format(format!(
                        "RGB frame length mismatch: expected {}, got {}",
                        expected,
                        buf.len()
                    )));
                }
                VideoFrame::new(buf[..expected].to_vec(), self.width, self.height, 0, 0)
            }
        };

        self.sequence = self.sequence.wrapping_add(1);
        frame.sequence = self.sequence;
        frame.timestamp_ns = now_ns();
        debug!("Captured frame {} ({} bytes)", frame.sequence, used);
        Ok(frame)
    }
}
