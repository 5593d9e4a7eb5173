//! Video frame types and processing

use crate::CameraError;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat, RgbImage};

/// Pixel format delivered by a capture device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Mjpeg,
    Yuyv,
}

/// Decoded RGB video frame
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds since the Unix epoch)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Create a frame filled with a single color
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Self::new(data, width, height, 0, 0)
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        self.data
            .get(idx..idx + 3)
            .map(|p| [p[0], p[1], p[2]])
    }

    /// Mirror the frame left to right
    pub fn flip_horizontal(&self) -> VideoFrame {
        let row_len = (self.width * 3) as usize;
        let mut flipped = Vec::with_capacity(self.data.len());
        for row in self.data.chunks(row_len) {
            for pixel in row.chunks(3).rev() {
                flipped.extend_from_slice(pixel);
            }
        }

        VideoFrame {
            data: flipped,
            width: self.width,
            height: self.height,
            timestamp_ns: self.timestamp_ns,
            sequence: self.sequence,
        }
    }

    /// Copy the pixels into an `image` buffer
    pub fn to_rgb_image(&self) -> Result<RgbImage, CameraError> {
        RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            CameraError::Format(format!(
                "expected {} RGB bytes for {}x{}, got {}",
                self.width * self.height * 3,
                self.width,
                self.height,
                self.data.len()
            ))
        })
    }

    /// Encode as JPEG
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>, CameraError> {
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality)
            .encode(&self.data, self.width, self.height, ExtendedColorType::Rgb8)
            .map_err(|e| CameraError::Decode(e.to_string()))?;
        Ok(out)
    }
}

/// Decode MJPEG frame to RGB
pub fn decode_mjpeg(mjpeg_data: &[u8]) -> Result<VideoFrame, CameraError> {
    let img = image::load_from_memory_with_format(mjpeg_data, ImageFormat::Jpeg)
        .map_err(|e| CameraError::Decode(e.to_string()))?;
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    Ok(VideoFrame::new(rgb.into_raw(), width, height, 0, 0))
}

/// Convert packed YUYV 4:2:2 to RGB
pub fn yuyv_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<VideoFrame, CameraError> {
    let expected = (width * height * 2) as usize;
    if pixels.len() < expected {
        return Err(CameraError::Format(format!(
            "YUYV frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        )));
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in pixels[..expected].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0], chunk[2]] {
            let y = y as f32;
            rgb.push(clamp_to_u8(y + 1.402 * v));
            rgb.push(clamp_to_u8(y - 0.344_136 * u - 0.714_136 * v));
            rgb.push(clamp_to_u8(y + 1.772 * u));
        }
    }

    Ok(VideoFrame::new(rgb, width, height, 0, 0))
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> VideoFrame {
        let mut data = Vec::new();
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, 0]);
            }
        }
        VideoFrame::new(data, width, height, 7, 3)
    }

    #[test]
    fn test_flip_horizontal_mirrors_columns() {
        let frame = gradient(4, 2);
        let flipped = frame.flip_horizontal();

        assert_eq!(flipped.get_pixel(0, 0), Some([3, 0, 0]));
        assert_eq!(flipped.get_pixel(3, 1), Some([0, 1, 0]));
        assert_eq!(flipped.sequence, 3);
        assert_eq!(flipped.flip_horizontal(), frame);
    }

    #[test]
    fn test_get_pixel_out_of_bounds() {
        let frame = gradient(2, 2);
        assert!(frame.get_pixel(2, 0).is_none());
        assert!(frame.get_pixel(0, 2).is_none());
    }

    #[test]
    fn test_jpeg_encode_decode() {
        let frame = VideoFrame::solid(16, 8, [200, 40, 40]);
        let jpeg = frame.to_jpeg(90).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = decode_mjpeg(&jpeg).unwrap();
        assert_eq!((decoded.width, decoded.height), (16, 8));
        let px = decoded.get_pixel(4, 4).unwrap();
        assert!(px[0] > 150 && px[1] < 90);
    }

    #[test]
    fn test_to_rgb_image_rejects_short_buffer() {
        let frame = VideoFrame::new(vec![0; 10], 4, 4, 0, 0);
        assert!(matches!(frame.to_rgb_image(), Err(CameraError::Format(_))));
    }

    #[test]
    fn test_yuyv_gray() {
        // Y=128, U=V=128 is mid gray
        let pixels = [128u8, 128, 128, 128];
        let frame = yuyv_to_rgb(&pixels, 2, 1).unwrap();
        assert_eq!(frame.data, vec![128; 6]);
    }
}
