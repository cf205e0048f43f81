//! vegwatch - analyse a clip for vegetation stress
//!
//! Reads frames from a local video, an image directory or a `stub://` scene,
//! writes `<runs>/<run_id>/occurrences.json` and `summary.json`, and re-scores
//! the occurrences with the shared model when one has been trained.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use vegwatch::{pipeline, AnalysisConfig, FileConfig, FileSource, RunArchive};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about = "Flag vegetation stress regions in a video")]
struct Args {
    /// Video file, image directory, or stub://green|soil-patch|bare-soil
    #[arg(long, short)]
    input: String,

    /// Run archive root (also holds the model and the label ledger)
    #[arg(long, default_value = "runs")]
    runs: PathBuf,

    /// Run identifier (random when omitted)
    #[arg(long)]
    run_id: Option<String>,

    /// TOML analysis config
    #[arg(long, env = "VEGWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Analyse every Nth frame
    #[arg(long, value_name = "N")]
    every: Option<u32>,

    /// Minimum region area in full-resolution pixels
    #[arg(long)]
    min_area: Option<f64>,

    /// Number of indices that must agree (2 or 3)
    #[arg(long)]
    agree_k: Option<u8>,

    /// Minimum severity for an occurrence
    #[arg(long)]
    min_severity: Option<f64>,

    /// Analyse frames even when they read as bare soil
    #[arg(long)]
    disable_soil_guard: bool,

    /// Frame rate override (fps)
    #[arg(long)]
    fps: Option<f64>,

    /// Frames produced by stub:// scenes
    #[arg(long, default_value_t = 90)]
    stub_frames: u64,

    /// Annotate model scores without adjusting confidence or type
    #[arg(long)]
    no_boost: bool,

    /// Progress display on stderr
    #[arg(long, value_enum, default_value_t = ui::UiMode::Auto)]
    ui: ui::UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let console = ui::Console::detect(args.ui);

    let config = {
        let _step = console.step("Load config");
        load_config(&args)?
    };

    let archive = RunArchive::new(&args.runs);
    let run_id = args.run_id.clone().unwrap_or_else(RunArchive::new_run_id);
    archive.run_dir(&run_id)?;

    let mut source = FileSource::new(FileConfig {
        path: args.input.clone(),
        fps: args.fps,
        frame_count: args.stub_frames,
        ..FileConfig::default()
    })?;

    let result = {
        let mut step = console.step("Analyse frames");
        pipeline::run_with_progress(&mut source, &config, Some(&run_id), |summary| {
            step.note(&format!(
                "{} frames, {} occurrences",
                summary.frames_seen, summary.occurrences
            ));
        })?
    };

    let occurrences = {
        let _step = console.step("Apply model");
        boost(&archive, &config, result.occurrences)
    };

    let (occ_path, summary_path) = {
        let _step = console.step("Write results");
        let mut summary = result.summary;
        summary.occurrences = occurrences.len();
        (
            archive.write_occurrences(&run_id, &occurrences)?,
            archive.write_summary(&run_id, &summary)?,
        )
    };

    println!(
        "{}",
        serde_json::json!({
            "run_id": run_id,
            "occurrences": occurrences.len(),
            "occurrences_path": occ_path,
            "summary_path": summary_path,
        })
    );
    Ok(())
}

fn load_config(args: &Args) -> Result<AnalysisConfig> {
    let mut config = AnalysisConfig::load_from(args.config.as_deref())?;
    if let Some(every) = args.every {
        config.sample_stride = every;
    }
    if let Some(min_area) = args.min_area {
        config.detector.min_area = min_area;
    }
    if let Some(agree_k) = args.agree_k {
        config.detector.agree_k = agree_k;
    }
    if let Some(min_severity) = args.min_severity {
        config.scoring.min_severity = min_severity;
    }
    if args.disable_soil_guard {
        config.detector.soil_guard_enabled = false;
    }
    if args.no_boost {
        config.boost.enabled = false;
    }
    config.validate()?;
    Ok(config)
}

#[cfg(feature = "learning")]
fn boost(
    archive: &RunArchive,
    config: &AnalysisConfig,
    occurrences: Vec<vegwatch::Occurrence>,
) -> Vec<vegwatch::Occurrence> {
    use vegwatch::{ConfidenceBooster, StressModel};

    let model = match StressModel::load(&archive.model_path()) {
        Ok(model) => model,
        Err(e) => {
            log::warn!("ignoring unusable model: {:#}", e);
            None
        }
    };
    ConfidenceBooster::new(model.as_ref(), &config.boost).apply(occurrences)
}

#[cfg(not(feature = "learning"))]
fn boost(
    _archive: &RunArchive,
    _config: &AnalysisConfig,
    occurrences: Vec<vegwatch::Occurrence>,
) -> Vec<vegwatch::Occurrence> {
    occurrences
}
