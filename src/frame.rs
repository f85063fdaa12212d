use crate::error::CameraError;
use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Pixel layout of a raw analysis buffer delivered by the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Single 8-bit luma plane
    Gray8,
    /// Planar YUV 4:2:0, luma plane first
    I420,
    /// Packed YUV 4:2:2 (Y0 U Y1 V)
    Yuyv,
    /// Packed 8-bit RGB
    Rgb24,
}

impl PixelFormat {
    /// Buffer length required for a frame of the given size
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self {
            PixelFormat::Gray8 => w * h,
            PixelFormat::I420 => w * h + 2 * (w.div_ceil(2) * h.div_ceil(2)),
            PixelFormat::Yuyv => w.div_ceil(2) * 4 * h,
            PixelFormat::Rgb24 => w * h * 3,
        }
    }

    /// Caps format string for GStreamer raw video
    pub fn gst_format(&self) -> &'static str {
        match self {
            PixelFormat::Gray8 => "GRAY8",
            PixelFormat::I420 => "I420",
            PixelFormat::Yuyv => "YUY2",
            PixelFormat::Rgb24 => "RGB",
        }
    }
}

/// Low-resolution luma frame used for a single motion comparison
#[derive(Debug, Clone)]
pub struct AnalysisFrame {
    /// Monotonic sequence number assigned by the frame source
    pub sequence: u64,
    /// When the frame was pulled from the sensor
    pub captured_at: Instant,
    luma: GrayImage,
}

impl AnalysisFrame {
    /// Wrap an existing luma image
    pub fn new(sequence: u64, captured_at: Instant, luma: GrayImage) -> Self {
        Self {
            sequence,
            captured_at,
            luma,
        }
    }

    /// Build a frame from a raw sensor buffer, keeping only the luma channel
    pub fn from_raw(
        sequence: u64,
        captured_at: Instant,
        width: u32,
        height: u32,
        format: PixelFormat,
        data: &[u8],
    ) -> Result<Self, CameraError> {
        let expected = format.frame_size(width, height);
        if data.len() < expected {
            return Err(CameraError::FrameSize {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }

        let luma = match format {
            PixelFormat::Gray8 | PixelFormat::I420 => {
                let plane = data[..(width as usize * height as usize)].to_vec();
                GrayImage::from_raw(width, height, plane).ok_or(CameraError::FrameSize {
                    width,
                    height,
                    expected,
                    actual: data.len(),
                })?
            }
            PixelFormat::Yuyv => yuyv_to_luma(width, height, data),
            PixelFormat::Rgb24 => rgb24_to_luma(width, height, data),
        };

        Ok(Self::new(sequence, captured_at, luma))
    }

    pub fn width(&self) -> u32 {
        self.luma.width()
    }

    pub fn height(&self) -> u32 {
        self.luma.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.luma.dimensions()
    }

    pub fn luma(&self) -> &GrayImage {
        &self.luma
    }

    pub fn into_luma(self) -> GrayImage {
        self.luma
    }
}

// YUYV: Y0 U Y1 V, 4 bytes for 2 pixels
fn yuyv_to_luma(width: u32, height: u32, data: &[u8]) -> GrayImage {
    let stride = (width as usize).div_ceil(2) * 4;
    GrayImage::from_fn(width, height, |x, y| {
        Luma([data[y as usize * stride + x as usize * 2]])
    })
}

fn rgb24_to_luma(width: u32, height: u32, data: &[u8]) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let idx = (y as usize * width as usize + x as usize) * 3;
        let value =
            0.299 * data[idx] as f32 + 0.587 * data[idx + 1] as f32 + 0.114 * data[idx + 2] as f32;
        Luma([value.round().min(255.0) as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_sizes() {
        assert_eq!(PixelFormat::Gray8.frame_size(640, 480), 307_200);
        assert_eq!(PixelFormat::I420.frame_size(640, 480), 460_800);
        assert_eq!(PixelFormat::Yuyv.frame_size(640, 480), 614_400);
        assert_eq!(PixelFormat::Rgb24.frame_size(4, 2), 24);
        // Odd widths round chroma planes up
        assert_eq!(PixelFormat::I420.frame_size(3, 3), 9 + 2 * 4);
    }

    #[test]
    fn test_i420_keeps_luma_plane() {
        let (width, height) = (4, 2);
        let mut data: Vec<u8> = (0..8).collect();
        data.extend_from_slice(&[200; 4]);

        let frame =
            AnalysisFrame::from_raw(7, Instant::now(), width, height, PixelFormat::I420, &data)
                .unwrap();

        assert_eq!(frame.sequence, 7);
        assert_eq!(frame.dimensions(), (4, 2));
        assert_eq!(frame.luma().get_pixel(3, 1)[0], 7);
    }

    #[test]
    fn test_yuyv_extracts_even_bytes() {
        let data = vec![10, 128, 20, 128, 30, 128, 40, 128];
        let frame =
            AnalysisFrame::from_raw(0, Instant::now(), 2, 2, PixelFormat::Yuyv, &data).unwrap();
        assert_eq!(frame.luma().as_raw(), &vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_rgb24_conversion() {
        let data = vec![255, 255, 255, 0, 0, 0];
        let frame =
            AnalysisFrame::from_raw(0, Instant::now(), 2, 1, PixelFormat::Rgb24, &data).unwrap();
        assert_eq!(frame.luma().get_pixel(0, 0)[0], 255);
        assert_eq!(frame.luma().get_pixel(1, 0)[0], 0);
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let result = AnalysisFrame::from_raw(0, Instant::now(), 4, 4, PixelFormat::I420, &[0; 10]);
        assert!(matches!(
            result,
            Err(CameraError::FrameSize {
                expected: 24,
                actual: 10,
                ..
            })
        ));
    }
}
