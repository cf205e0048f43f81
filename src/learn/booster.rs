//! Confidence booster: layers model scores over rule-based occurrences.

use super::model::StressModel;
use crate::config::BoostSettings;
use crate::occurrence::{
    round_to, MlAnnotation, Occurrence, OccurrenceKind, Qualifier, StressClass,
};

/// Applies a trained model to fresh occurrences.
///
/// Adjustments only ever raise confidence. A low score adds the
/// `possible_false_positive` qualifier; a high score on a `low_signal`
/// occurrence escalates it to `critical_signal`.
pub struct ConfidenceBooster<'a> {
    model: Option<&'a StressModel>,
    settings: BoostSettings,
}

impl<'a> ConfidenceBooster<'a> {
    pub fn new(model: Option<&'a StressModel>, settings: &BoostSettings) -> Self {
        Self {
            model,
            settings: settings.clone(),
        }
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    pub fn apply(&self, occurrences: Vec<Occurrence>) -> Vec<Occurrence> {
        let Some(model) = self.model else {
            return occurrences;
        };
        let mut escalated = 0usize;
        let mut flagged = 0usize;
        let out: Vec<Occurrence> = occurrences
            .into_iter()
            .map(|mut occ| {
                let score = model.score(&occ);
                occ.ml = Some(MlAnnotation {
                    score: round_to(score, 3),
                });
                if !self.settings.enabled {
                    return occ;
                }

                let original = occ.confidence;
                let from_model = (score * 100.0).round().clamp(0.0, 100.0) as u8;
                occ.confidence = original.max(from_model);

                if score < self.settings.false_positive_below
                    && original < self.settings.false_positive_confidence_ceiling
                {
                    occ.kind = occ.kind.clone().with(Qualifier::PossibleFalsePositive);
                    flagged += 1;
                }
                if score > self.settings.escalate_above && occ.kind.base == StressClass::LowSignal
                {
                    occ.kind = OccurrenceKind::new(StressClass::CriticalSignal);
                    escalated += 1;
                }
                occ
            })
            .collect();
        log::info!(
            "boost: scored {} occurrence(s), {} escalated, {} flagged as possible false positive",
            out.len(),
            escalated,
            flagged
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{feature_names, FEATURE_COUNT};
    use crate::occurrence::{BBox, Evidence};

    /// Model whose score depends only on the vari evidence: p = sigmoid(-10 * vari).
    fn vari_model() -> StressModel {
        let mut weights = vec![0.0; FEATURE_COUNT];
        weights[0] = -10.0;
        StressModel {
            feature_names: feature_names(),
            weights,
            intercept: 0.0,
            examples: 10,
            positive_fraction: 0.5,
        }
    }

    fn occurrence(vari: f64, confidence: u8) -> Occurrence {
        Occurrence {
            run_id: None,
            frame: 0,
            time_s: 0.0,
            bbox: BBox::from([0, 0, 10, 10]),
            area_px: 0,
            kind: OccurrenceKind::new(StressClass::LowSignal),
            confidence,
            recommendation: String::new(),
            evidence: Evidence {
                vari: Some(vari),
                ..Evidence::default()
            },
            ml: None,
        }
    }

    #[test]
    fn no_model_passes_through() {
        let occs = vec![occurrence(-0.2, 80), occurrence(0.3, 92)];
        let booster = ConfidenceBooster::new(None, &BoostSettings::default());
        assert_eq!(booster.apply(occs.clone()), occs);
    }

    #[test]
    fn high_score_escalates_low_signal() {
        let model = vari_model();
        let booster = ConfidenceBooster::new(Some(&model), &BoostSettings::default());
        let out = booster.apply(vec![occurrence(-0.3, 80)]);
        // sigmoid(3) ~ 0.953
        assert_eq!(out[0].ml, Some(MlAnnotation { score: 0.953 }));
        assert_eq!(out[0].confidence, 95);
        assert_eq!(out[0].kind, OccurrenceKind::new(StressClass::CriticalSignal));
    }

    #[test]
    fn low_score_flags_without_lowering_confidence() {
        let model = vari_model();
        let booster = ConfidenceBooster::new(Some(&model), &BoostSettings::default());
        let out = booster.apply(vec![occurrence(0.3, 80), occurrence(0.3, 92)]);
        assert_eq!(out[0].confidence, 80);
        assert_eq!(out[0].kind.base, StressClass::LowSignal);
        assert!(out[0].kind.has(Qualifier::PossibleFalsePositive));
        // Confident rule-based calls are not second-guessed.
        assert_eq!(out[1].confidence, 92);
        assert!(!out[1].kind.has(Qualifier::PossibleFalsePositive));
    }

    #[test]
    fn never_decreases_confidence() {
        let model = vari_model();
        let booster = ConfidenceBooster::new(Some(&model), &BoostSettings::default());
        let input: Vec<Occurrence> = [-0.5, -0.1, 0.0, 0.05, 0.2, 0.6]
            .iter()
            .zip([70u8, 80, 92, 100, 85, 60])
            .map(|(&v, c)| occurrence(v, c))
            .collect();
        let out = booster.apply(input.clone());
        for (before, after) in input.iter().zip(&out) {
            assert!(after.confidence >= before.confidence);
            assert!(after.ml.is_some());
        }
    }

    #[test]
    fn disabled_boost_only_annotates() {
        let model = vari_model();
        let settings = BoostSettings {
            enabled: false,
            ..BoostSettings::default()
        };
        let booster = ConfidenceBooster::new(Some(&model), &settings);
        let out = booster.apply(vec![occurrence(-0.3, 80)]);
        assert_eq!(out[0].confidence, 80);
        assert_eq!(out[0].kind, OccurrenceKind::new(StressClass::LowSignal));
        assert!(out[0].ml.is_some());
    }
}
