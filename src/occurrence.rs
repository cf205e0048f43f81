//! Occurrence records: the persisted output of an analysis run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::detect::region::PixelRect;

/// Base classification of a flagged region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressClass {
    LowSignal,
    CanopyGap,
    ExposedSoil,
    CriticalSignal,
}

impl StressClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            StressClass::LowSignal => "low_signal",
            StressClass::CanopyGap => "canopy_gap",
            StressClass::ExposedSoil => "exposed_soil",
            StressClass::CriticalSignal => "critical_signal",
        }
    }
}

/// Annotations layered on top of the base class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Qualifier {
    PossibleFalsePositive,
}

impl Qualifier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Qualifier::PossibleFalsePositive => "possible_false_positive",
        }
    }
}

/// Base class plus qualifier tags.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccurrenceKind {
    pub base: StressClass,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub qualifiers: BTreeSet<Qualifier>,
}

impl OccurrenceKind {
    pub fn new(base: StressClass) -> Self {
        Self {
            base,
            qualifiers: BTreeSet::new(),
        }
    }

    pub fn with(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.insert(qualifier);
        self
    }

    pub fn has(&self, qualifier: Qualifier) -> bool {
        self.qualifiers.contains(&qualifier)
    }
}

impl fmt::Display for OccurrenceKind {
    /// `base|qualifier|...`, the flat form used in label ledgers.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base.as_str())?;
        for q in &self.qualifiers {
            write!(f, "|{}", q.as_str())?;
        }
        Ok(())
    }
}

/// Bounding box `[x, y, w, h]` in full-resolution pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i64; 4]", into = "[i64; 4]")]
pub struct BBox {
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
}

impl BBox {
    /// Width over height; 1.0 when the box is degenerate.
    pub fn aspect_ratio(&self) -> f64 {
        if self.h <= 0 || self.w < 0 {
            return 1.0;
        }
        self.w as f64 / self.h as f64
    }
}

impl From<[i64; 4]> for BBox {
    fn from(v: [i64; 4]) -> Self {
        Self {
            x: v[0],
            y: v[1],
            w: v[2],
            h: v[3],
        }
    }
}

impl From<BBox> for [i64; 4] {
    fn from(b: BBox) -> Self {
        [b.x, b.y, b.w, b.h]
    }
}

impl From<PixelRect> for BBox {
    fn from(r: PixelRect) -> Self {
        Self {
            x: r.x as i64,
            y: r.y as i64,
            w: r.w as i64,
            h: r.h as i64,
        }
    }
}

/// Index means and auxiliary ratios backing an occurrence.
///
/// Every field may be absent in older or hand-written records.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vari: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ngrdi: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ifv: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zmin: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roi_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub near_veg_ratio: Option<f64>,
}

/// Classifier annotation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MlAnnotation {
    /// Probability that the occurrence is a confirmed stress region.
    pub score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub frame: u64,
    pub time_s: f64,
    pub bbox: BBox,
    pub area_px: u64,
    #[serde(rename = "type")]
    pub kind: OccurrenceKind,
    pub confidence: u8,
    pub recommendation: String,
    #[serde(default)]
    pub evidence: Evidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ml: Option<MlAnnotation>,
}

/// The occurrence with the largest `area_px` on `frame`; the first one wins ties.
pub fn largest_on_frame(occurrences: &[Occurrence], frame: u64) -> Option<&Occurrence> {
    let mut best: Option<&Occurrence> = None;
    for occ in occurrences.iter().filter(|o| o.frame == frame) {
        match best {
            Some(current) if occ.area_px <= current.area_px => {}
            _ => best = Some(occ),
        }
    }
    best
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
