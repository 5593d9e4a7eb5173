//! Frame preprocessing for square-input detectors

use camera_capture::VideoFrame;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::Array4;

use crate::{BBox, DetectionError};

/// Padding color used by YOLO letterboxing
const PAD_VALUE: u8 = 114;

/// Mapping between letterboxed model input and the original frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    /// Map a box from model-input pixels back to frame pixels
    pub fn to_frame(&self, bbox: BBox) -> BBox {
        BBox::new(
            (bbox.x - self.pad_x) / self.scale,
            (bbox.y - self.pad_y) / self.scale,
            bbox.width / self.scale,
            bbox.height / self.scale,
        )
    }
}

/// Resize `frame` into a `size`x`size` NCHW tensor, preserving aspect ratio.
///
/// Pixels are normalized to 0..1.
pub fn letterbox(frame: &VideoFrame, size: u32) -> Result<(Array4<f32>, Letterbox), DetectionError> {
    if size == 0 {
        return Err(DetectionError::ImageProcessing("inference size must be > 0".into()));
    }
    let img = frame
        .to_rgb_image()
        .map_err(|e| DetectionError::ImageProcessing(e.to_string()))?;

    let scale = (size as f32 / frame.width as f32).min(size as f32 / frame.height as f32);
    let new_w = ((frame.width as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((frame.height as f32 * scale).round() as u32).clamp(1, size);
    let resized = imageops::resize(&img, new_w, new_h, FilterType::Triangle);

    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    let side = size as usize;
    let mut input = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in canvas.enumerate_pixels() {
        for c in 0..3 {
            input[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }

    Ok((
        input,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_landscape_pads_vertically() {
        let frame = VideoFrame::solid(640, 480, [255, 0, 0]);
        let (input, lb) = letterbox(&frame, 320).unwrap();

        assert_eq!(input.shape(), &[1, 3, 320, 320]);
        assert!((lb.scale - 0.5).abs() < 1e-6);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 40.0);

        // Padding rows are gray, content rows are red
        assert!((input[[0, 0, 0, 0]] - 114.0 / 255.0).abs() < 1e-6);
        assert!((input[[0, 0, 160, 160]] - 1.0).abs() < 1e-6);
        assert!(input[[0, 1, 160, 160]].abs() < 1e-6);
    }

    #[test]
    fn test_box_maps_back_to_frame() {
        let lb = Letterbox {
            scale: 0.5,
            pad_x: 0.0,
            pad_y: 40.0,
        };
        let mapped = lb.to_frame(BBox::new(10.0, 50.0, 20.0, 30.0));
        assert_eq!(mapped, BBox::new(20.0, 20.0, 40.0, 60.0));
    }

    #[test]
    fn test_zero_size_rejected() {
        let frame = VideoFrame::solid(4, 4, [0, 0, 0]);
        assert!(letterbox(&frame, 0).is_err());
    }
}
