/// Axis-aligned pixel rectangle; `w`/`h` are inclusive pixel counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl PixelRect {
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.w)
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.h)
    }

    pub fn contains(&self, other: &PixelRect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Tightest rectangle around a set of points.
    pub fn bounding(points: &[ContourPoint]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self {
            x: min_x.max(0) as u32,
            y: min_y.max(0) as u32,
            w: (max_x - min_x + 1) as u32,
            h: (max_y - min_y + 1) as u32,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContourPoint {
    pub x: i32,
    pub y: i32,
}

/// A connected low-signal region surviving consensus and cleanup.
#[derive(Clone, Debug, PartialEq)]
pub struct RegionCandidate {
    pub bbox: PixelRect,
    /// Polygon area enclosed by the contour.
    pub area: f64,
    pub contour: Vec<ContourPoint>,
}

impl RegionCandidate {
    pub fn from_contour(contour: Vec<ContourPoint>) -> Option<Self> {
        let bbox = PixelRect::bounding(&contour)?;
        Some(Self {
            bbox,
            area: polygon_area(&contour),
            contour,
        })
    }
}

/// Shoelace area of a closed polygon.
pub fn polygon_area(points: &[ContourPoint]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0i64;
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        twice += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    (twice as f64).abs() / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(raw: &[(i32, i32)]) -> Vec<ContourPoint> {
        raw.iter().map(|&(x, y)| ContourPoint { x, y }).collect()
    }

    #[test]
    fn square_contour_area_and_bbox() {
        let contour = pts(&[(2, 3), (2, 7), (6, 7), (6, 3)]);
        let region = RegionCandidate::from_contour(contour).expect("region");
        assert_eq!(region.area, 16.0);
        assert_eq!(region.bbox, PixelRect::new(2, 3, 5, 5));
    }

    #[test]
    fn degenerate_contours_have_zero_area() {
        assert_eq!(polygon_area(&pts(&[(0, 0), (4, 0)])), 0.0);
        assert!(RegionCandidate::from_contour(Vec::new()).is_none());
    }

    #[test]
    fn containment() {
        let outer = PixelRect::new(0, 0, 10, 10);
        assert!(outer.contains(&PixelRect::new(2, 2, 8, 8)));
        assert!(!outer.contains(&PixelRect::new(2, 2, 9, 8)));
    }
}
