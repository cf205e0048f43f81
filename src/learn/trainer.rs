//! Feedback trainer: joins reviewer labels with archived occurrences and fits
//! the stress model.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use super::model::{FitOptions, StressModel};
use crate::features::{occurrence_features, FeatureVector};
use crate::occurrence::{largest_on_frame, Occurrence};
use crate::storage::{LabelLedger, LabelRow, RunArchive};

pub const MIN_EXAMPLES: usize = 5;

const POSITIVE_LABELS: [&str; 4] = ["confirm", "confirmed", "positivo", "pos"];

/// Whether a reviewer label counts as a confirmed stress region.
pub fn is_positive_label(label: &str) -> bool {
    let label = label.trim().to_lowercase();
    POSITIVE_LABELS.contains(&label.as_str())
}

/// Labels and occurrences of one archived run.
#[derive(Clone, Debug, Default)]
pub struct RunRecord {
    pub run_id: String,
    pub labels: Vec<LabelRow>,
    pub occurrences: Vec<Occurrence>,
}

/// Joined training set.
#[derive(Clone, Debug, Default)]
pub struct Examples {
    pub features: Vec<FeatureVector>,
    pub labels: Vec<bool>,
    /// Label rows read, including those with no matching occurrence.
    pub label_rows: usize,
}

impl Examples {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&l| l).count()
    }
}

/// Pair every label with the largest occurrence on the same frame of its run.
///
/// Labels on frames with no occurrence are counted but produce no example.
pub fn collect_examples(runs: &[RunRecord]) -> Examples {
    let mut examples = Examples::default();
    for run in runs {
        for row in &run.labels {
            examples.label_rows += 1;
            let Some(occ) = largest_on_frame(&run.occurrences, row.frame) else {
                continue;
            };
            examples.features.push(occurrence_features(occ));
            examples.labels.push(is_positive_label(&row.label));
        }
    }
    examples
}

/// Read every labelled run; runs whose files cannot be read are skipped.
pub fn load_corpus(archive: &RunArchive, ledger: &dyn LabelLedger) -> Result<Vec<RunRecord>> {
    let mut corpus = Vec::new();
    for run_id in ledger.runs()? {
        let labels = match ledger.labels_for_run(&run_id) {
            Ok(labels) => labels,
            Err(e) => {
                log::warn!("skipping run {}: unreadable labels: {:#}", run_id, e);
                continue;
            }
        };
        let occurrences = match archive.read_occurrences(&run_id) {
            Ok(Some(occurrences)) => occurrences,
            Ok(None) => {
                log::debug!("skipping run {}: no occurrence file", run_id);
                continue;
            }
            Err(e) => {
                log::warn!("skipping run {}: {:#}", run_id, e);
                continue;
            }
        };
        corpus.push(RunRecord {
            run_id,
            labels,
            occurrences,
        });
    }
    Ok(corpus)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    InsufficientData,
    /// Every example carries the same label.
    SingleClass,
}

/// Outcome of one training attempt.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrainingReport {
    pub ok: bool,
    pub label_rows: usize,
    pub examples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positive_fraction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
}

impl TrainingReport {
    fn skipped(examples: &Examples, reason: SkipReason) -> Self {
        Self {
            ok: false,
            label_rows: examples.label_rows,
            examples: examples.len(),
            positive_fraction: None,
            reason: Some(reason),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FeedbackTrainer {
    pub min_examples: usize,
    pub options: FitOptions,
}

impl Default for FeedbackTrainer {
    fn default() -> Self {
        Self {
            min_examples: MIN_EXAMPLES,
            options: FitOptions::default(),
        }
    }
}

impl FeedbackTrainer {
    /// Fit a model, or explain why none was fitted.
    pub fn train(&self, examples: &Examples) -> Result<(TrainingReport, Option<StressModel>)> {
        if examples.len() < self.min_examples {
            log::info!(
                "training skipped: {} example(s), need {}",
                examples.len(),
                self.min_examples
            );
            return Ok((
                TrainingReport::skipped(examples, SkipReason::InsufficientData),
                None,
            ));
        }
        let positives = examples.positives();
        if positives == 0 || positives == examples.len() {
            log::info!(
                "training skipped: all {} examples share one label",
                examples.len()
            );
            return Ok((
                TrainingReport::skipped(examples, SkipReason::SingleClass),
                None,
            ));
        }

        let model = StressModel::fit(&examples.features, &examples.labels, &self.options)?;
        let report = TrainingReport {
            ok: true,
            label_rows: examples.label_rows,
            examples: examples.len(),
            positive_fraction: Some(model.positive_fraction),
            reason: None,
        };
        Ok((report, Some(model)))
    }

    /// Retrain from the whole archive and replace the model artifact on success.
    ///
    /// A skipped training leaves any existing artifact untouched.
    pub fn fit_and_save(
        &self,
        archive: &RunArchive,
        ledger: &dyn LabelLedger,
        model_path: &Path,
    ) -> Result<TrainingReport> {
        let corpus = load_corpus(archive, ledger)?;
        let examples = collect_examples(&corpus);
        let (report, model) = self.train(&examples)?;
        if let Some(model) = model {
            model.save(model_path)?;
        }
        Ok(report)
    }
}
