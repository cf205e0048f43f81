//! Working-frame ↔ full-resolution geometry.
//!
//! Forward mapping truncates like integer pixel casts do; the inverse rounds so
//! a working → full → working round trip stays within one pixel.

use anyhow::{anyhow, Result};

pub use super::region::{ContourPoint, PixelRect, RegionCandidate};

/// Ratio of full-resolution to working-frame size on each axis (always >= 1).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleFactor {
    pub sx: f64,
    pub sy: f64,
}

impl ScaleFactor {
    pub const fn identity() -> Self {
        Self { sx: 1.0, sy: 1.0 }
    }

    pub fn between(full_w: u32, full_h: u32, working_w: u32, working_h: u32) -> Result<Self> {
        if working_w == 0 || working_h == 0 {
            return Err(anyhow!("working frame must not be empty"));
        }
        if working_w > full_w || working_h > full_h {
            return Err(anyhow!(
                "working frame {}x{} larger than full frame {}x{}",
                working_w,
                working_h,
                full_w,
                full_h
            ));
        }
        Ok(Self {
            sx: full_w as f64 / working_w as f64,
            sy: full_h as f64 / working_h as f64,
        })
    }

    pub fn is_identity(&self) -> bool {
        self.sx == 1.0 && self.sy == 1.0
    }

    /// Area multiplier from working pixels to full-resolution pixels.
    pub fn area_factor(&self) -> f64 {
        self.sx * self.sy
    }

    pub fn rect_to_full(&self, rect: PixelRect) -> PixelRect {
        PixelRect {
            x: (rect.x as f64 * self.sx) as u32,
            y: (rect.y as f64 * self.sy) as u32,
            w: (rect.w as f64 * self.sx) as u32,
            h: (rect.h as f64 * self.sy) as u32,
        }
    }

    pub fn rect_to_working(&self, rect: PixelRect) -> PixelRect {
        PixelRect {
            x: (rect.x as f64 / self.sx).round() as u32,
            y: (rect.y as f64 / self.sy).round() as u32,
            w: (rect.w as f64 / self.sx).round() as u32,
            h: (rect.h as f64 / self.sy).round() as u32,
        }
    }

    fn point_to_full(&self, p: ContourPoint) -> ContourPoint {
        ContourPoint {
            x: (p.x as f64 * self.sx) as i32,
            y: (p.y as f64 * self.sy) as i32,
        }
    }

    fn point_to_working(&self, p: ContourPoint) -> ContourPoint {
        ContourPoint {
            x: (p.x as f64 / self.sx).round() as i32,
            y: (p.y as f64 / self.sy).round() as i32,
        }
    }

    /// Express a working-frame region in full-resolution coordinates.
    pub fn region_to_full(&self, region: &RegionCandidate) -> RegionCandidate {
        if self.is_identity() {
            return region.clone();
        }
        RegionCandidate {
            bbox: self.rect_to_full(region.bbox),
            area: region.area * self.area_factor(),
            contour: region
                .contour
                .iter()
                .map(|&p| self.point_to_full(p))
                .collect(),
        }
    }

    /// Express a full-resolution region in working-frame coordinates.
    pub fn region_to_working(&self, region: &RegionCandidate) -> RegionCandidate {
        if self.is_identity() {
            return region.clone();
        }
        RegionCandidate {
            bbox: self.rect_to_working(region.bbox),
            area: region.area / self.area_factor(),
            contour: region
                .contour
                .iter()
                .map(|&p| self.point_to_working(p))
                .collect(),
        }
    }
}

impl Default for ScaleFactor {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(x: u32, y: u32, w: u32, h: u32) -> RegionCandidate {
        let (x0, y0) = (x as i32, y as i32);
        let (x1, y1) = ((x + w - 1) as i32, (y + h - 1) as i32);
        RegionCandidate::from_contour(vec![
            ContourPoint { x: x0, y: y0 },
            ContourPoint { x: x0, y: y1 },
            ContourPoint { x: x1, y: y1 },
            ContourPoint { x: x1, y: y0 },
        ])
        .expect("region")
    }

    #[test]
    fn identity_is_a_no_op() {
        let scale = ScaleFactor::identity();
        let r = region(3, 4, 10, 12);
        assert_eq!(scale.region_to_full(&r), r);
        assert_eq!(scale.region_to_working(&r), r);
    }

    #[test]
    fn halved_frame_doubles_geometry() -> Result<()> {
        let scale = ScaleFactor::between(1920, 1080, 960, 540)?;
        let full = scale.region_to_full(&region(10, 20, 30, 40));
        assert_eq!(full.bbox, PixelRect::new(20, 40, 60, 80));
        assert_eq!(full.area, region(10, 20, 30, 40).area * 4.0);
        assert_eq!(full.contour[0], ContourPoint { x: 20, y: 40 });
        Ok(())
    }

    #[test]
    fn round_trip_within_one_pixel() -> Result<()> {
        let scales = [
            ScaleFactor::between(1920, 1080, 960, 540)?,
            ScaleFactor::between(1921, 1081, 960, 540)?,
            ScaleFactor::between(1000, 700, 667, 467)?,
        ];
        for scale in scales {
            for (x, y, w, h) in [(0, 0, 1, 1), (13, 7, 31, 17), (101, 55, 250, 199)] {
                let r = region(x, y, w, h);
                let back = scale.region_to_working(&scale.region_to_full(&r));
                let diff = |a: u32, b: u32| (a as i64 - b as i64).abs();
                assert!(diff(back.bbox.x, r.bbox.x) <= 1, "{:?} {:?}", scale, r.bbox);
                assert!(diff(back.bbox.y, r.bbox.y) <= 1, "{:?} {:?}", scale, r.bbox);
                assert!(diff(back.bbox.w, r.bbox.w) <= 1, "{:?} {:?}", scale, r.bbox);
                assert!(diff(back.bbox.h, r.bbox.h) <= 1, "{:?} {:?}", scale, r.bbox);
            }
        }
        Ok(())
    }

    #[test]
    fn rejects_upscaled_working_frame() {
        assert!(ScaleFactor::between(100, 100, 200, 100).is_err());
        assert!(ScaleFactor::between(100, 100, 0, 100).is_err());
    }
}
