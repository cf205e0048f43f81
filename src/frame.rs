//! Frame containers.
//!
//! - `Frame`: full-resolution BGR raster handed over by a frame source.
//! - `WorkingFrame`: the raster index analysis actually runs on. Frames whose
//!   longest side exceeds the working cap are halved; smaller frames are
//!   borrowed as-is.
//!
//! Pixel data is always 3 interleaved channels in blue/green/red order.

use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb, RgbImage};
use std::borrow::Cow;

use crate::detect::scale::ScaleFactor;

/// Full-resolution frame in BGR byte order.
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Position of this frame in the source stream.
    pub index: u64,
}

impl Frame {
    pub fn from_bgr(index: u64, width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = expected_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "BGR frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            index,
        })
    }

    /// Build from RGB-ordered bytes (decoders usually emit RGB).
    pub fn from_rgb(index: u64, width: u32, height: u32, rgb: &[u8]) -> Result<Self> {
        let expected = expected_len(width, height)?;
        if rgb.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                rgb.len()
            ));
        }
        let mut data = rgb.to_vec();
        for px in data.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
        Self::from_bgr(index, width, height, data)
    }

    pub fn from_rgb_image(index: u64, image: &RgbImage) -> Result<Self> {
        Self::from_rgb(index, image.width(), image.height(), image.as_raw())
    }

    /// A frame filled with one BGR color.
    pub fn solid(index: u64, width: u32, height: u32, bgr: [u8; 3]) -> Result<Self> {
        let len = expected_len(width, height)?;
        let data = bgr.iter().copied().cycle().take(len).collect();
        Self::from_bgr(index, width, height, data)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Overwrite a rectangle with one BGR color. Out-of-frame parts are ignored.
    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, bgr: [u8; 3]) {
        let x_end = x.saturating_add(w).min(self.width);
        let y_end = y.saturating_add(h).min(self.height);
        for row in y.min(self.height)..y_end {
            for col in x.min(self.width)..x_end {
                let offset = ((row as usize) * (self.width as usize) + col as usize) * 3;
                self.data[offset..offset + 3].copy_from_slice(&bgr);
            }
        }
    }

    /// Working copy for index analysis.
    ///
    /// When `max(width, height) > max_dim` the frame is resized to half its size
    /// with bilinear filtering; otherwise the pixels are borrowed and the scale is 1.
    pub fn working(&self, max_dim: u32) -> Result<WorkingFrame<'_>> {
        if self.width.max(self.height) <= max_dim {
            return Ok(WorkingFrame {
                pixels: Cow::Borrowed(&self.data),
                width: self.width,
                height: self.height,
                scale: ScaleFactor::identity(),
            });
        }

        let working_w = (self.width / 2).max(1);
        let working_h = (self.height / 2).max(1);
        // Channel order is irrelevant to resampling, so BGR bytes go through an Rgb buffer.
        let source: ImageBuffer<Rgb<u8>, &[u8]> =
            ImageBuffer::from_raw(self.width, self.height, self.data.as_slice())
                .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
        let resized = imageops::resize(&source, working_w, working_h, FilterType::Triangle);

        Ok(WorkingFrame {
            pixels: Cow::Owned(resized.into_raw()),
            width: working_w,
            height: working_h,
            scale: ScaleFactor::between(self.width, self.height, working_w, working_h)?,
        })
    }
}

/// Raster used for index computation and region search.
pub struct WorkingFrame<'a> {
    pixels: Cow<'a, [u8]>,
    pub width: u32,
    pub height: u32,
    /// Maps working coordinates to full-resolution coordinates.
    pub scale: ScaleFactor,
}

impl<'a> WorkingFrame<'a> {
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn is_downscaled(&self) -> bool {
        matches!(self.pixels, Cow::Owned(_))
    }
}

fn expected_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer() {
        assert!(Frame::from_bgr(0, 4, 4, vec![0u8; 10]).is_err());
    }

    #[test]
    fn rgb_input_is_stored_as_bgr() -> Result<()> {
        let frame = Frame::from_rgb(3, 1, 1, &[10, 20, 30])?;
        assert_eq!(frame.pixels(), &[30, 20, 10]);
        assert_eq!(frame.index, 3);
        Ok(())
    }

    #[test]
    fn small_frames_are_borrowed_at_unit_scale() -> Result<()> {
        let frame = Frame::solid(0, 640, 480, [40, 180, 60])?;
        let working = frame.working(1280)?;
        assert!(!working.is_downscaled());
        assert_eq!((working.width, working.height), (640, 480));
        assert_eq!(working.scale, ScaleFactor::identity());
        Ok(())
    }

    #[test]
    fn large_frames_are_halved() -> Result<()> {
        let frame = Frame::solid(0, 1920, 1080, [40, 180, 60])?;
        let working = frame.working(1280)?;
        assert!(working.is_downscaled());
        assert_eq!((working.width, working.height), (960, 540));
        assert_eq!(working.scale.sx, 2.0);
        assert_eq!(working.scale.sy, 2.0);
        // Resampling a flat color keeps it flat.
        assert_eq!(&working.pixels()[..3], &[40, 180, 60]);
        Ok(())
    }

    #[test]
    fn fill_rect_clips_to_frame() -> Result<()> {
        let mut frame = Frame::solid(0, 4, 4, [0, 0, 0])?;
        frame.fill_rect(2, 2, 10, 10, [1, 2, 3]);
        let px = |x: usize, y: usize| &frame.pixels()[(y * 4 + x) * 3..(y * 4 + x) * 3 + 3];
        assert_eq!(px(3, 3), &[1, 2, 3]);
        assert_eq!(px(1, 1), &[0, 0, 0]);
        Ok(())
    }
}
