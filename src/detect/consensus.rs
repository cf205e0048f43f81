//! Multi-index consensus masking and region extraction.

use image::{imageops, GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};

use super::morphology::{self, StructuringElement, FOREGROUND};
use super::region::{ContourPoint, RegionCandidate};
use super::scale::ScaleFactor;
use crate::config::{CleanupPolicy, DetectorSettings, IndexThresholds};
use crate::indices::IndexTriple;

/// Thresholds each index, keeps pixels where at least `agree_k` indices read
/// low, cleans the mask and extracts outer contours as region candidates.
#[derive(Clone, Debug)]
pub struct ConsensusDetector {
    thresholds: IndexThresholds,
    agree_k: u8,
    min_area: f64,
    cleanup: CleanupPolicy,
    element: StructuringElement,
}

impl ConsensusDetector {
    pub fn new(settings: &DetectorSettings, thresholds: &IndexThresholds) -> Self {
        Self {
            thresholds: thresholds.clone(),
            agree_k: settings.agree_k,
            min_area: settings.min_area,
            cleanup: settings.cleanup,
            element: StructuringElement::ellipse(settings.open_radius),
        }
    }

    /// Per-pixel vote count (0..=3) of low-signal indices.
    pub fn votes(&self, triple: &IndexTriple) -> Vec<u8> {
        let t = &self.thresholds;
        triple
            .vari
            .iter()
            .zip(&triple.ngrdi)
            .zip(&triple.ifv)
            .map(|((&v, &n), &f)| {
                (v < t.vari) as u8 + (n < t.ngrdi) as u8 + (f < t.ifv) as u8
            })
            .collect()
    }

    /// Raw consensus mask before cleanup.
    pub fn consensus_mask(&self, triple: &IndexTriple) -> GrayImage {
        let votes = self.votes(triple);
        let width = triple.width as usize;
        GrayImage::from_fn(triple.width, triple.height, |x, y| {
            let agreed = votes[y as usize * width + x as usize] >= self.agree_k;
            Luma([if agreed { FOREGROUND } else { 0 }])
        })
    }

    /// Consensus mask after morphological cleanup.
    pub fn cleaned_mask(&self, triple: &IndexTriple) -> GrayImage {
        let mask = self.consensus_mask(triple);
        let opened = morphology::open(&mask, &self.element);
        match self.cleanup {
            CleanupPolicy::Open => opened,
            CleanupPolicy::OpenClose => morphology::close(&opened, &self.element),
        }
    }

    /// Region candidates in working-frame coordinates.
    ///
    /// Candidates whose area, rescaled by `scale`, falls below the configured
    /// floor are dropped.
    pub fn detect(&self, triple: &IndexTriple, scale: ScaleFactor) -> Vec<RegionCandidate> {
        let mask = self.cleaned_mask(triple);
        let area_factor = scale.area_factor();
        let candidates: Vec<RegionCandidate> = extract_regions(&mask)
            .into_iter()
            .filter(|region| region.area * area_factor >= self.min_area)
            .collect();
        log::debug!(
            "consensus: k={} kept {} region(s) over {:.0} px",
            self.agree_k,
            candidates.len(),
            self.min_area
        );
        candidates
    }
}

/// Outer contours of every top-level foreground component.
///
/// The mask is traced inside a one-pixel background frame so components
/// touching the image edge still come back as outer borders.
pub fn extract_regions(mask: &GrayImage) -> Vec<RegionCandidate> {
    let padded = pad_with_background(mask);
    find_contours::<i32>(&padded)
        .into_iter()
        .filter(|contour| contour.parent.is_none() && contour.border_type == BorderType::Outer)
        .filter_map(|contour| {
            let points = contour
                .points
                .into_iter()
                .map(|p| ContourPoint {
                    x: p.x - 1,
                    y: p.y - 1,
                })
                .collect();
            RegionCandidate::from_contour(points)
        })
        .collect()
}

fn pad_with_background(mask: &GrayImage) -> GrayImage {
    let mut padded = GrayImage::new(mask.width() + 2, mask.height() + 2);
    imageops::replace(&mut padded, mask, 1, 1);
    padded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::region::PixelRect;

    const GREEN: (f32, f32, f32) = (0.6, 0.5, 0.64);
    const SOIL: (f32, f32, f32) = (-0.29, -0.22, 0.31);
    const BARE: (f32, f32, f32) = (-0.5, -0.4, 0.2);

    /// Triple filled with `base`, with `patches` of other values.
    fn triple(
        w: u32,
        h: u32,
        base: (f32, f32, f32),
        patches: &[(PixelRect, (f32, f32, f32))],
    ) -> IndexTriple {
        let mut t = IndexTriple {
            width: w,
            height: h,
            vari: vec![base.0; (w * h) as usize],
            ngrdi: vec![base.1; (w * h) as usize],
            ifv: vec![base.2; (w * h) as usize],
        };
        for (rect, value) in patches {
            for y in rect.y..rect.bottom() {
                for x in rect.x..rect.right() {
                    let i = (y * w + x) as usize;
                    t.vari[i] = value.0;
                    t.ngrdi[i] = value.1;
                    t.ifv[i] = value.2;
                }
            }
        }
        t
    }

    fn detector(agree_k: u8, min_area: f64) -> ConsensusDetector {
        let settings = DetectorSettings {
            agree_k,
            min_area,
            ..DetectorSettings::default()
        };
        ConsensusDetector::new(&settings, &IndexThresholds::default())
    }

    #[test]
    fn healthy_canopy_yields_nothing() {
        let t = triple(64, 48, GREEN, &[]);
        assert!(detector(2, 0.0).detect(&t, ScaleFactor::identity()).is_empty());
    }

    #[test]
    fn soil_patch_is_one_region() {
        let patch = PixelRect::new(10, 8, 30, 20);
        let t = triple(64, 48, GREEN, &[(patch, SOIL)]);
        let regions = detector(2, 100.0).detect(&t, ScaleFactor::identity());
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bbox, patch);
        // Contour runs through pixel centres, opening shaves the corners.
        assert!((regions[0].area - 29.0 * 19.0).abs() < 10.0);
    }

    #[test]
    fn speckle_is_removed() {
        let t = triple(32, 32, GREEN, &[(PixelRect::new(5, 5, 2, 2), SOIL)]);
        assert!(detector(2, 0.0).detect(&t, ScaleFactor::identity()).is_empty());
    }

    #[test]
    fn min_area_is_measured_at_full_resolution() {
        let t = triple(64, 48, GREEN, &[(PixelRect::new(10, 8, 12, 12), SOIL)]);
        // Working area is 11 * 11 = 121.
        let det = detector(2, 400.0);
        assert!(det.detect(&t, ScaleFactor::identity()).is_empty());
        let halved = ScaleFactor { sx: 2.0, sy: 2.0 };
        assert_eq!(det.detect(&t, halved).len(), 1);
    }

    #[test]
    fn two_of_three_agreement() {
        // Only VARI and NGRDI read low, IFV stays above its threshold.
        let partial = (-0.1, -0.1, 0.5);
        let patch = PixelRect::new(4, 4, 20, 20);
        let t = triple(40, 40, GREEN, &[(patch, partial)]);
        assert_eq!(detector(2, 0.0).detect(&t, ScaleFactor::identity()).len(), 1);
        assert!(detector(3, 0.0).detect(&t, ScaleFactor::identity()).is_empty());
    }

    #[test]
    fn stricter_agreement_is_a_subset() {
        let partial = (-0.1, -0.1, 0.5);
        let t = triple(
            80,
            60,
            GREEN,
            &[
                (PixelRect::new(2, 2, 30, 25), partial),
                (PixelRect::new(8, 6, 12, 10), BARE),
                (PixelRect::new(45, 30, 25, 20), BARE),
            ],
        );
        let loose = detector(2, 0.0);
        let strict = detector(3, 0.0);

        let loose_mask = loose.cleaned_mask(&t);
        let strict_mask = strict.cleaned_mask(&t);
        for (x, y, p) in strict_mask.enumerate_pixels() {
            if p[0] == FOREGROUND {
                assert_eq!(loose_mask.get_pixel(x, y)[0], FOREGROUND);
            }
        }

        let loose_regions = loose.detect(&t, ScaleFactor::identity());
        let strict_regions = strict.detect(&t, ScaleFactor::identity());
        assert_eq!(strict_regions.len(), 2);
        assert!(strict_regions.len() <= loose_regions.len());
        for region in &strict_regions {
            assert!(
                loose_regions.iter().any(|l| l.bbox.contains(&region.bbox)),
                "{:?} not inside any k=2 region",
                region.bbox
            );
        }
    }

    #[test]
    fn regions_on_the_frame_edge_are_kept() {
        let corner = PixelRect::new(0, 0, 20, 15);
        let t = triple(64, 48, GREEN, &[(corner, SOIL)]);
        let regions = detector(2, 100.0).detect(&t, ScaleFactor::identity());
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bbox, corner);

        let edge = PixelRect::new(40, 30, 24, 18);
        let t = triple(64, 48, GREEN, &[(edge, SOIL)]);
        let regions = detector(2, 100.0).detect(&t, ScaleFactor::identity());
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bbox, edge);
    }

    #[test]
    fn whole_frame_is_one_region() {
        let t = triple(64, 48, BARE, &[]);
        let regions = detector(2, 100.0).detect(&t, ScaleFactor::identity());
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bbox, PixelRect::new(0, 0, 64, 48));
    }

    #[test]
    fn closing_merges_nearby_fragments() {
        let patches = [
            (PixelRect::new(4, 4, 12, 10), SOIL),
            (PixelRect::new(18, 4, 12, 10), SOIL),
        ];
        let t = triple(40, 24, GREEN, &patches);

        let open_only = detector(2, 0.0);
        assert_eq!(open_only.detect(&t, ScaleFactor::identity()).len(), 2);

        let settings = DetectorSettings {
            agree_k: 2,
            min_area: 0.0,
            cleanup: CleanupPolicy::OpenClose,
            ..DetectorSettings::default()
        };
        let closing = ConsensusDetector::new(&settings, &IndexThresholds::default());
        let regions = closing.detect(&t, ScaleFactor::identity());
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bbox, PixelRect::new(4, 4, 26, 10));
    }
}
