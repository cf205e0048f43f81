//! Per-pixel vegetation indices.
//!
//! Three visible-band indices are computed over a BGR raster:
//! - VARI  = (g - r) / (g + r - b), clipped to [-1, 1]
//! - NGRDI = (g - r) / (g + r),     clipped to [-1, 1]
//! - IFV   = g / (r + g + b),       clipped to [0, 1]
//!
//! Every channel and denominator is offset by a small epsilon so black or
//! degenerate pixels never divide by zero. Rows are processed in parallel.

use rayon::prelude::*;

use crate::detect::scale::PixelRect;
use crate::frame::WorkingFrame;

const EPS: f32 = 1e-6;

/// Pixels above this IFV count as nearby vegetation.
pub const NEAR_VEGETATION_IFV: f32 = 0.4;
/// Quantile of VARI reported as `zmin`.
pub const ZMIN_QUANTILE: f64 = 0.1;

/// The three index planes of one working frame, row-major.
#[derive(Clone, Debug)]
pub struct IndexTriple {
    pub width: u32,
    pub height: u32,
    pub vari: Vec<f32>,
    pub ngrdi: Vec<f32>,
    pub ifv: Vec<f32>,
}

/// Mean index values over a rectangle, with the number of pixels sampled.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegionMeans {
    pub vari: f64,
    pub ngrdi: f64,
    pub ifv: f64,
    pub samples: usize,
}

/// Frame-wide statistics attached to every occurrence as auxiliary evidence.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameStats {
    pub zmin: f64,
    pub roi_ratio: f64,
    pub near_veg_ratio: f64,
}

#[inline]
fn channels(px: &[u8]) -> (f32, f32, f32) {
    (
        px[0] as f32 + EPS,
        px[1] as f32 + EPS,
        px[2] as f32 + EPS,
    )
}

#[inline]
pub fn vari(b: f32, g: f32, r: f32) -> f32 {
    ((g - r) / (g + r - b + EPS)).clamp(-1.0, 1.0)
}

#[inline]
pub fn ngrdi(g: f32, r: f32) -> f32 {
    ((g - r) / (g + r + EPS)).clamp(-1.0, 1.0)
}

#[inline]
pub fn ifv(b: f32, g: f32, r: f32) -> f32 {
    (g / (r + g + b + EPS)).clamp(0.0, 1.0)
}

impl IndexTriple {
    pub fn compute(frame: &WorkingFrame<'_>) -> Self {
        Self::from_bgr(frame.width, frame.height, frame.pixels())
    }

    /// Compute all three planes from interleaved BGR bytes.
    pub fn from_bgr(width: u32, height: u32, pixels: &[u8]) -> Self {
        let vari = pixels
            .par_chunks_exact(3)
            .map(|px| {
                let (b, g, r) = channels(px);
                vari(b, g, r)
            })
            .collect();
        let ngrdi = pixels
            .par_chunks_exact(3)
            .map(|px| {
                let (_, g, r) = channels(px);
                ngrdi(g, r)
            })
            .collect();
        let ifv = pixels
            .par_chunks_exact(3)
            .map(|px| {
                let (b, g, r) = channels(px);
                ifv(b, g, r)
            })
            .collect();
        Self {
            width,
            height,
            vari,
            ngrdi,
            ifv,
        }
    }

    pub fn len(&self) -> usize {
        self.vari.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vari.is_empty()
    }

    pub fn mean_vari(&self) -> f64 {
        mean(&self.vari)
    }

    pub fn mean_ngrdi(&self) -> f64 {
        mean(&self.ngrdi)
    }

    pub fn mean_ifv(&self) -> f64 {
        mean(&self.ifv)
    }

    /// Means of the three indices inside `rect`, clipped to the raster.
    ///
    /// Returns `None` when the clipped rectangle is empty.
    pub fn region_means(&self, rect: PixelRect) -> Option<RegionMeans> {
        let x0 = rect.x.min(self.width);
        let y0 = rect.y.min(self.height);
        let x1 = rect.x.saturating_add(rect.w).min(self.width);
        let y1 = rect.y.saturating_add(rect.h).min(self.height);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }

        let (mut sv, mut sn, mut sf) = (0.0f64, 0.0f64, 0.0f64);
        let w = self.width as usize;
        for row in y0 as usize..y1 as usize {
            let start = row * w + x0 as usize;
            let end = row * w + x1 as usize;
            sv += self.vari[start..end].iter().map(|&v| v as f64).sum::<f64>();
            sn += self.ngrdi[start..end].iter().map(|&v| v as f64).sum::<f64>();
            sf += self.ifv[start..end].iter().map(|&v| v as f64).sum::<f64>();
        }
        let samples = ((x1 - x0) as usize) * ((y1 - y0) as usize);
        let n = samples as f64;
        Some(RegionMeans {
            vari: sv / n,
            ngrdi: sn / n,
            ifv: sf / n,
            samples,
        })
    }

    /// Frame-wide auxiliary statistics. The whole frame is the region of interest.
    pub fn frame_stats(&self) -> FrameStats {
        let near_veg = self
            .ifv
            .iter()
            .filter(|&&v| v > NEAR_VEGETATION_IFV)
            .count();
        FrameStats {
            zmin: quantile(&self.vari, ZMIN_QUANTILE),
            roi_ratio: 1.0,
            near_veg_ratio: if self.is_empty() {
                0.0
            } else {
                near_veg as f64 / self.len() as f64
            },
        }
    }
}

fn mean(values: &[f32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
}

/// Linear-interpolated quantile, `q` in [0, 1].
fn quantile(values: &[f32], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] as f64 + (sorted[hi] as f64 - sorted[lo] as f64) * frac
}
