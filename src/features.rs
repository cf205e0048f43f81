//! Fixed-order numeric features of an occurrence.
//!
//! Training and inference both go through [`occurrence_features`]; the model
//! artifact stores [`FEATURE_NAMES`] and refuses to load under a different order.

use crate::occurrence::Occurrence;

pub const FEATURE_COUNT: usize = 8;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "vari",
    "ngrdi",
    "ifv",
    "zmin",
    "roi_ratio",
    "near_veg_ratio",
    "area_px",
    "aspect",
];

pub type FeatureVector = [f64; FEATURE_COUNT];

/// `[vari, ngrdi, ifv, zmin, roi_ratio, near_veg_ratio, ln(1 + area_px), aspect]`.
///
/// Missing evidence reads as 0.0, except `roi_ratio` which reads as 1.0.
pub fn occurrence_features(occ: &Occurrence) -> FeatureVector {
    let ev = &occ.evidence;
    [
        ev.vari.unwrap_or(0.0),
        ev.ngrdi.unwrap_or(0.0),
        ev.ifv.unwrap_or(0.0),
        ev.zmin.unwrap_or(0.0),
        ev.roi_ratio.unwrap_or(1.0),
        ev.near_veg_ratio.unwrap_or(0.0),
        (occ.area_px as f64).ln_1p(),
        occ.bbox.aspect_ratio(),
    ]
}

pub fn feature_names() -> Vec<String> {
    FEATURE_NAMES.iter().map(|name| name.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occurrence::{BBox, Evidence, OccurrenceKind, StressClass};

    fn occurrence(evidence: Evidence, bbox: [i64; 4], area_px: u64) -> Occurrence {
        Occurrence {
            run_id: None,
            frame: 0,
            time_s: 0.0,
            bbox: BBox::from(bbox),
            area_px,
            kind: OccurrenceKind::new(StressClass::LowSignal),
            confidence: 80,
            recommendation: String::new(),
            evidence,
            ml: None,
        }
    }

    #[test]
    fn full_evidence_in_fixed_order() {
        let occ = occurrence(
            Evidence {
                vari: Some(-0.1),
                ngrdi: Some(-0.05),
                ifv: Some(0.3),
                severity: Some(1.2),
                zmin: Some(-0.4),
                roi_ratio: Some(0.9),
                near_veg_ratio: Some(0.6),
            },
            [0, 0, 200, 100],
            6000,
        );
        let f = occurrence_features(&occ);
        assert_eq!(&f[..6], &[-0.1, -0.05, 0.3, -0.4, 0.9, 0.6]);
        assert!((f[6] - 6001f64.ln()).abs() < 1e-12);
        assert_eq!(f[7], 2.0);
        assert_eq!(occurrence_features(&occ), f);
    }

    #[test]
    fn missing_evidence_uses_defaults() {
        let occ = occurrence(Evidence::default(), [5, 5, 10, 0], 0);
        assert_eq!(
            occurrence_features(&occ),
            [0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0]
        );
    }

    #[test]
    fn names_match_vector_length() {
        assert_eq!(feature_names().len(), FEATURE_COUNT);
        assert_eq!(feature_names()[6], "area_px");
    }
}
