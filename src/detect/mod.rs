//! Per-frame stress detection.
//!
//! A frame goes through the soil guard, multi-index consensus, scale
//! reconciliation and severity scoring, in that order. [`Analyzer`] wires the
//! stages together; each stage is usable on its own.

pub mod consensus;
pub mod morphology;
pub mod region;
pub mod scale;
pub mod severity;
pub mod soil_guard;

use anyhow::Result;

use crate::config::AnalysisConfig;
use crate::frame::Frame;
use crate::indices::IndexTriple;
use crate::occurrence::Occurrence;

pub use consensus::ConsensusDetector;
pub use region::{ContourPoint, PixelRect, RegionCandidate};
pub use scale::ScaleFactor;
pub use severity::{Assessment, Rejection, SeverityScorer};
pub use soil_guard::SoilGuard;

/// What happened to one analysed frame.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameOutcome {
    /// The frame read as bare soil and was not searched for regions.
    SoilSkipped,
    Analyzed {
        occurrences: Vec<Occurrence>,
        /// Regions found by consensus before severity filtering.
        candidates: usize,
    },
}

impl FrameOutcome {
    pub fn occurrences(&self) -> &[Occurrence] {
        match self {
            FrameOutcome::SoilSkipped => &[],
            FrameOutcome::Analyzed { occurrences, .. } => occurrences,
        }
    }

    pub fn into_occurrences(self) -> Vec<Occurrence> {
        match self {
            FrameOutcome::SoilSkipped => Vec::new(),
            FrameOutcome::Analyzed { occurrences, .. } => occurrences,
        }
    }
}

pub struct Analyzer {
    max_working_dim: u32,
    soil_guard: SoilGuard,
    detector: ConsensusDetector,
    scorer: SeverityScorer,
}

impl Analyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            max_working_dim: config.detector.max_working_dim,
            soil_guard: SoilGuard::new(&config.detector, &config.thresholds),
            detector: ConsensusDetector::new(&config.detector, &config.thresholds),
            scorer: SeverityScorer::new(&config.scoring),
        }
    }

    /// Analyse one full-resolution frame.
    ///
    /// `fps` converts the frame index to a timestamp; a non-positive rate
    /// yields timestamps of zero.
    pub fn analyze_frame(
        &self,
        frame: &Frame,
        fps: f64,
        run_id: Option<&str>,
    ) -> Result<FrameOutcome> {
        let working = frame.working(self.max_working_dim)?;
        let triple = IndexTriple::compute(&working);

        if self.soil_guard.is_soil(&triple) {
            return Ok(FrameOutcome::SoilSkipped);
        }

        let scale = working.scale;
        let candidates = self.detector.detect(&triple, scale);
        if candidates.is_empty() {
            return Ok(FrameOutcome::Analyzed {
                occurrences: Vec::new(),
                candidates: 0,
            });
        }

        let stats = triple.frame_stats();
        let time_s = if fps > 0.0 {
            frame.index as f64 / fps
        } else {
            0.0
        };

        let mut occurrences = Vec::new();
        for candidate in &candidates {
            let full = scale.region_to_full(candidate);
            // Sample statistics back on the working raster through the inverse mapping.
            let sample = scale.rect_to_working(full.bbox);
            let Some(means) = triple.region_means(sample) else {
                continue;
            };
            match self.scorer.assess(&means) {
                Ok(assessment) => {
                    let mut occ = self.scorer.occurrence(
                        frame.index,
                        time_s,
                        &full,
                        &means,
                        &stats,
                        &assessment,
                    );
                    occ.run_id = run_id.map(str::to_string);
                    occurrences.push(occ);
                }
                Err(rejection) => {
                    log::trace!(
                        "frame {}: region {:?} rejected: {:?}",
                        frame.index,
                        full.bbox,
                        rejection
                    );
                }
            }
        }

        Ok(FrameOutcome::Analyzed {
            occurrences,
            candidates: candidates.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occurrence::StressClass;

    const GREEN: [u8; 3] = [40, 180, 60];
    const EARTH: [u8; 3] = [60, 90, 140];
    const DRY: [u8; 3] = [70, 80, 150];

    fn config(min_area: f64) -> AnalysisConfig {
        let mut cfg = AnalysisConfig::default();
        cfg.detector.min_area = min_area;
        cfg
    }

    #[test]
    fn green_frame_has_no_occurrences() -> Result<()> {
        let frame = Frame::solid(0, 120, 80, GREEN)?;
        let outcome = Analyzer::new(&config(100.0)).analyze_frame(&frame, 30.0, None)?;
        assert_eq!(
            outcome,
            FrameOutcome::Analyzed {
                occurrences: Vec::new(),
                candidates: 0
            }
        );
        Ok(())
    }

    #[test]
    fn bare_frame_is_skipped_by_soil_guard() -> Result<()> {
        let frame = Frame::solid(0, 120, 80, DRY)?;
        let analyzer = Analyzer::new(&config(100.0));
        assert_eq!(
            analyzer.analyze_frame(&frame, 30.0, None)?,
            FrameOutcome::SoilSkipped
        );

        let mut cfg = config(100.0);
        cfg.detector.soil_guard_enabled = false;
        let outcome = Analyzer::new(&cfg).analyze_frame(&frame, 30.0, None)?;
        assert_eq!(outcome.occurrences().len(), 1);
        Ok(())
    }

    #[test]
    fn earth_patch_becomes_an_occurrence() -> Result<()> {
        let mut frame = Frame::solid(45, 200, 100, GREEN)?;
        frame.fill_rect(10, 10, 60, 40, EARTH);
        let outcome = Analyzer::new(&config(100.0)).analyze_frame(&frame, 30.0, Some("r1"))?;
        let occs = outcome.occurrences();
        assert_eq!(occs.len(), 1);
        let occ = &occs[0];
        assert_eq!(occ.frame, 45);
        assert_eq!(occ.time_s, 1.5);
        assert_eq!(occ.run_id.as_deref(), Some("r1"));
        assert_eq!(occ.kind.base, StressClass::LowSignal);
        assert_eq!([occ.bbox.x, occ.bbox.y, occ.bbox.w, occ.bbox.h], [10, 10, 60, 40]);
        assert!(occ.evidence.severity.unwrap_or_default() >= 0.9);
        assert_eq!(occ.evidence.roi_ratio, Some(1.0));
        Ok(())
    }

    #[test]
    fn large_frames_report_full_resolution_boxes() -> Result<()> {
        let mut frame = Frame::solid(0, 1600, 900, GREEN)?;
        frame.fill_rect(200, 100, 400, 300, EARTH);
        let outcome = Analyzer::new(&config(6000.0)).analyze_frame(&frame, 30.0, None)?;
        let occs = outcome.occurrences();
        assert_eq!(occs.len(), 1);
        let b = occs[0].bbox;
        assert!((b.x - 200).abs() <= 2, "{:?}", b);
        assert!((b.y - 100).abs() <= 2, "{:?}", b);
        assert!((b.w - 400).abs() <= 4, "{:?}", b);
        assert!((b.h - 300).abs() <= 4, "{:?}", b);
        assert!(occs[0].area_px > 100_000);
        Ok(())
    }

    #[test]
    fn patch_in_the_corner_is_reported() -> Result<()> {
        let mut frame = Frame::solid(0, 200, 100, GREEN)?;
        frame.fill_rect(0, 0, 80, 60, EARTH);
        let outcome = Analyzer::new(&config(100.0)).analyze_frame(&frame, 30.0, None)?;
        let occs = outcome.occurrences();
        assert_eq!(occs.len(), 1);
        let b = occs[0].bbox;
        assert_eq!([b.x, b.y, b.w, b.h], [0, 0, 80, 60]);
        Ok(())
    }

    #[test]
    fn unguarded_bare_frame_covers_the_whole_frame() -> Result<()> {
        let frame = Frame::solid(0, 200, 100, DRY)?;
        let mut cfg = config(100.0);
        cfg.detector.soil_guard_enabled = false;
        let outcome = Analyzer::new(&cfg).analyze_frame(&frame, 30.0, None)?;
        let occs = outcome.occurrences();
        assert_eq!(occs.len(), 1);
        let b = occs[0].bbox;
        assert_eq!([b.x, b.y, b.w, b.h], [0, 0, 200, 100]);
        Ok(())
    }
}
