//! vegwatch: vegetation stress detection over video frames.
//!
//! # Architecture
//!
//! Each sampled frame flows through a fixed chain of stages:
//!
//! 1. **Index Engine** (`indices`): VARI, NGRDI and IFV per pixel on a working
//!    copy of the frame (halved when the frame is large).
//! 2. **Soil Guard** (`detect::soil_guard`): vetoes frames that are mostly bare soil.
//! 3. **Consensus Detector** (`detect::consensus`): keeps pixels where at least
//!    k of the three indices read low, cleans the mask, extracts outer contours.
//! 4. **Scale Reconciler** (`detect::scale`): maps regions back to full resolution.
//! 5. **Severity Scorer** (`detect::severity`): scores, classifies and emits
//!    [`Occurrence`] records.
//!
//! A reviewer loop closes over the archived runs: labels go to a ledger
//! (`storage`), the feedback trainer fits a small logistic model, and the
//! confidence booster re-scores fresh occurrences with it (`learn`, feature
//! `learning`). Detection never requires a model.
//!
//! # Module Structure
//!
//! - `config`: analysis knobs, TOML file plus environment overrides
//! - `frame`: full-resolution and working rasters
//! - `ingest`: frame sources (synthetic, image sequences, video files)
//! - `pipeline`: per-run driver and summary
//! - `storage`: run archive, label ledger, model artifact path

pub mod config;
pub mod detect;
pub mod features;
pub mod frame;
pub mod indices;
pub mod ingest;
#[cfg(feature = "learning")]
pub mod learn;
pub mod occurrence;
pub mod pipeline;
pub mod storage;

pub use config::{AnalysisConfig, BoostSettings, CleanupPolicy, Taxonomy};
pub use detect::{Analyzer, FrameOutcome};
pub use features::{occurrence_features, FeatureVector, FEATURE_NAMES};
pub use frame::{Frame, WorkingFrame};
pub use indices::IndexTriple;
pub use ingest::{FileConfig, FileSource, FrameSource};
#[cfg(feature = "learning")]
pub use learn::{ConfidenceBooster, FeedbackTrainer, StressModel, TrainingReport};
pub use occurrence::{BBox, Evidence, Occurrence, OccurrenceKind, Qualifier, StressClass};
pub use pipeline::{run, run_with_progress, RunResult, RunSummary};
pub use storage::{InMemoryLabelLedger, LabelLedger, LabelRow, RunArchive, SqliteLabelLedger};
