//! Decoded frames.
//!
//! Every source (video file, synthetic stream, still image from a relay client)
//! hands frames to the rest of the crate as a `Frame`: packed RGB24 pixels plus
//! dimensions. Detectors only ever see `&Frame`.

use anyhow::{anyhow, Context, Result};

/// Width and height of a decoded frame, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// One decoded frame in packed RGB24 layout.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Wrap RGB24 pixels, validating the buffer length against the dimensions.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// A frame filled with a single color.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let count = width as usize * height as usize;
        let mut data = Vec::with_capacity(count * 3);
        for _ in 0..count {
            data.extend_from_slice(&rgb);
        }
        Self {
            data,
            width,
            height,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    /// Rec. 601 luma of the pixel at (x, y).
    pub fn luma(&self, x: u32, y: u32) -> f32 {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        let r = self.data[idx] as f32;
        let g = self.data[idx + 1] as f32;
        let b = self.data[idx + 2] as f32;
        0.299 * r + 0.587 * g + 0.114 * b
    }
}

/// Decode a still image (JPEG or PNG) into an RGB24 frame.
pub fn decode_image(bytes: &[u8]) -> Result<Frame> {
    let image = image::load_from_memory(bytes).context("decode image")?;
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    Frame::new(rgb.into_raw(), width, height)
}

fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn rejects_short_buffers() {
        assert!(Frame::new(vec![0u8; 11], 2, 2).is_err());
        assert!(Frame::new(vec![0u8; 12], 2, 2).is_ok());
    }

    #[test]
    fn decodes_png_round_trip() -> Result<()> {
        let img = image::RgbImage::from_pixel(8, 4, image::Rgb([10, 20, 30]));
        let mut encoded = Vec::new();
        img.write_to(&mut Cursor::new(&mut encoded), image::ImageFormat::Png)?;

        let frame = decode_image(&encoded)?;
        assert_eq!(frame.size(), FrameSize::new(8, 4));
        assert_eq!(&frame.pixels()[..3], &[10, 20, 30]);
        Ok(())
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(decode_image(b"definitely not an image").is_err());
    }

    #[test]
    fn solid_frame_has_uniform_luma() {
        let frame = Frame::solid(3, 3, [200, 200, 200]);
        assert_eq!(frame.luma(0, 0), frame.luma(2, 2));
    }
}
