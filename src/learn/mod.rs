//! Reviewer-feedback learning (feature: learning).
//!
//! Detection never depends on this module: without a trained model the
//! booster passes occurrences through untouched.

pub mod booster;
pub mod model;
pub mod trainer;

pub use booster::ConfidenceBooster;
pub use model::{FitOptions, StressModel};
pub use trainer::{
    collect_examples, is_positive_label, load_corpus, Examples, FeedbackTrainer, RunRecord,
    SkipReason, TrainingReport,
};
