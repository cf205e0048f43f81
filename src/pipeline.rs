//! Run driver: pulls frames from a source, samples every Nth, analyses it and
//! gathers the run's occurrences in frame order.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::detect::{Analyzer, FrameOutcome};
use crate::ingest::FrameSource;
use crate::occurrence::Occurrence;

/// Counters persisted next to a run's occurrences.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub frames_seen: u64,
    pub frames_processed: u64,
    pub soil_skipped: u64,
    pub occurrences: usize,
    pub fps: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunResult {
    pub occurrences: Vec<Occurrence>,
    pub summary: RunSummary,
}

pub fn run(
    source: &mut dyn FrameSource,
    config: &AnalysisConfig,
    run_id: Option<&str>,
) -> Result<RunResult> {
    run_with_progress(source, config, run_id, |_| {})
}

/// Like [`run`], calling `on_frame` with the running summary after each
/// analysed frame.
pub fn run_with_progress(
    source: &mut dyn FrameSource,
    config: &AnalysisConfig,
    run_id: Option<&str>,
    mut on_frame: impl FnMut(&RunSummary),
) -> Result<RunResult> {
    config.validate()?;
    source.connect().context("failed to open frame source")?;

    let analyzer = Analyzer::new(config);
    let stride = u64::from(config.sample_stride.max(1));
    let fps = source.fps();
    let mut summary = RunSummary {
        fps,
        ..RunSummary::default()
    };
    let mut occurrences = Vec::new();

    log::info!(
        "run {}: sampling every {} frame(s) at {:.2} fps",
        run_id.unwrap_or("-"),
        stride,
        fps
    );

    while let Some(frame) = source.next_frame()? {
        summary.frames_seen += 1;
        if frame.index % stride != 0 {
            continue;
        }
        summary.frames_processed += 1;
        match analyzer.analyze_frame(&frame, fps, run_id)? {
            FrameOutcome::SoilSkipped => {
                summary.soil_skipped += 1;
                log::debug!("frame {}: soil guard veto", frame.index);
            }
            FrameOutcome::Analyzed {
                occurrences: found,
                candidates,
            } => {
                log::debug!(
                    "frame {}: {} candidate(s), {} occurrence(s)",
                    frame.index,
                    candidates,
                    found.len()
                );
                occurrences.extend(found);
            }
        }
        summary.occurrences = occurrences.len();
        on_frame(&summary);
    }

    log::info!(
        "run {}: {} frame(s) seen, {} analysed, {} soil-skipped, {} occurrence(s)",
        run_id.unwrap_or("-"),
        summary.frames_seen,
        summary.frames_processed,
        summary.soil_skipped,
        summary.occurrences
    );
    Ok(RunResult {
        occurrences,
        summary,
    })
}
