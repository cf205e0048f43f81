//! Severity scoring and rule-based classification of region candidates.

use crate::config::{ScoringSettings, SeverityWeights, Taxonomy};
use crate::indices::{FrameStats, RegionMeans};
use crate::occurrence::{round_to, BBox, Evidence, Occurrence, OccurrenceKind, StressClass};

use super::region::RegionCandidate;

pub const RECOMMEND_HIGH: &str =
    "High priority: inspect immediately; check irrigation, soil and pests around the area.";
pub const RECOMMEND_MODERATE: &str =
    "Moderate attention: monitor over time; check irrigation and field management.";
pub const RECOMMEND_LOW: &str =
    "Low or ambiguous signal: review in the field or repeat the flight to confirm.";

/// Severity, type, confidence and recommendation for one region.
#[derive(Clone, Debug, PartialEq)]
pub struct Assessment {
    pub severity: f64,
    pub kind: StressClass,
    pub confidence: u8,
    pub recommendation: &'static str,
}

/// Why a candidate did not become an occurrence.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Rejection {
    TooFewPixels { samples: usize },
    BelowSeverity { severity: f64 },
}

/// Sum of per-index shortfalls below their healthy reference; never negative.
pub fn severity(means: &RegionMeans, weights: &SeverityWeights) -> f64 {
    let term = |reference: f64, value: f64, weight: f64| ((reference - value) * weight).max(0.0);
    term(weights.vari_ref, means.vari, weights.vari_weight)
        + term(weights.ngrdi_ref, means.ngrdi, weights.ngrdi_weight)
        + term(weights.ifv_ref, means.ifv, weights.ifv_weight)
}

#[derive(Clone, Debug)]
pub struct SeverityScorer {
    settings: ScoringSettings,
}

impl SeverityScorer {
    pub fn new(settings: &ScoringSettings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    pub fn settings(&self) -> &ScoringSettings {
        &self.settings
    }

    /// Score a region from its working-frame index means.
    pub fn assess(&self, means: &RegionMeans) -> Result<Assessment, Rejection> {
        if means.samples < self.settings.min_region_pixels {
            return Err(Rejection::TooFewPixels {
                samples: means.samples,
            });
        }
        let severity = severity(means, &self.settings.weights);
        if severity < self.settings.min_severity {
            return Err(Rejection::BelowSeverity { severity });
        }
        Ok(Assessment {
            severity,
            kind: self.classify(means),
            confidence: self.confidence(severity),
            recommendation: self.recommendation(severity),
        })
    }

    pub fn classify(&self, means: &RegionMeans) -> StressClass {
        match self.settings.taxonomy {
            Taxonomy::Generic => StressClass::LowSignal,
            Taxonomy::Extended => {
                let rules = &self.settings.extended;
                if means.ifv < rules.canopy_gap_ifv && means.vari < rules.canopy_gap_vari {
                    StressClass::CanopyGap
                } else if means.vari < rules.exposed_soil_vari && means.ifv < rules.exposed_soil_ifv
                {
                    StressClass::ExposedSoil
                } else {
                    StressClass::LowSignal
                }
            }
        }
    }

    pub fn confidence(&self, severity: f64) -> u8 {
        if severity < self.settings.confidence_split {
            self.settings.confidence_low
        } else {
            self.settings.confidence_high
        }
    }

    pub fn recommendation(&self, severity: f64) -> &'static str {
        if severity >= self.settings.recommend_high {
            RECOMMEND_HIGH
        } else if severity >= self.settings.recommend_moderate {
            RECOMMEND_MODERATE
        } else {
            RECOMMEND_LOW
        }
    }

    /// Assemble the occurrence record for a full-resolution region.
    pub fn occurrence(
        &self,
        frame: u64,
        time_s: f64,
        region: &RegionCandidate,
        means: &RegionMeans,
        stats: &FrameStats,
        assessment: &Assessment,
    ) -> Occurrence {
        Occurrence {
            run_id: None,
            frame,
            time_s: round_to(time_s, 3),
            bbox: BBox::from(region.bbox),
            area_px: region.area.max(0.0) as u64,
            kind: OccurrenceKind::new(assessment.kind),
            confidence: assessment.confidence,
            recommendation: assessment.recommendation.to_string(),
            evidence: Evidence {
                vari: Some(round_to(means.vari, 3)),
                ngrdi: Some(round_to(means.ngrdi, 3)),
                ifv: Some(round_to(means.ifv, 3)),
                severity: Some(round_to(assessment.severity, 2)),
                zmin: Some(round_to(stats.zmin, 3)),
                roi_ratio: Some(round_to(stats.roi_ratio, 3)),
                near_veg_ratio: Some(round_to(stats.near_veg_ratio, 3)),
            },
            ml: None,
        }
    }
}
