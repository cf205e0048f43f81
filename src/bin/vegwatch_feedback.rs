//! vegwatch_feedback - reviewer labels and model retraining
//!
//! `label` appends a verdict for one frame of a run to the label ledger and
//! retrains the shared model from every labelled run. `train` retrains
//! without adding a label; `status` reports what is stored.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use vegwatch::storage::{now_s, record_label};
use vegwatch::{FeedbackTrainer, LabelLedger, RunArchive, SqliteLabelLedger};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about = "Record reviewer feedback and retrain the stress model")]
struct Args {
    /// Run archive root
    #[arg(long, default_value = "runs", global = true)]
    runs: PathBuf,

    /// Progress display on stderr
    #[arg(long, value_enum, default_value_t = ui::UiMode::Auto, global = true)]
    ui: ui::UiMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a verdict for one frame and retrain
    Label {
        #[arg(long)]
        run_id: String,
        #[arg(long)]
        frame: u64,
        /// confirm | confirmed | pos | positivo count as positive; anything else is negative
        #[arg(long)]
        label: String,
    },
    /// Retrain from all labelled runs
    Train,
    /// Show model and ledger state
    Status,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let console = ui::Console::detect(args.ui);

    let archive = RunArchive::new(&args.runs);
    let mut ledger = {
        let _step = console.step("Open label ledger");
        SqliteLabelLedger::open(&archive.ledger_path())?
    };

    match args.command {
        Command::Label {
            run_id,
            frame,
            label,
        } => {
            {
                let _step = console.step("Record label");
                record_label(&archive, &mut ledger, &run_id, frame, &label, now_s()?)?;
            }
            retrain(&console, &archive, &ledger)
        }
        Command::Train => retrain(&console, &archive, &ledger),
        Command::Status => {
            let model_path = archive.model_path();
            println!(
                "{}",
                serde_json::json!({
                    "has_model": model_path.exists(),
                    "model_path": model_path,
                    "labels": ledger.count()?,
                    "labelled_runs": ledger.runs()?,
                    "runs": archive.list_runs()?,
                })
            );
            Ok(())
        }
    }
}

fn retrain(console: &ui::Console, archive: &RunArchive, ledger: &dyn LabelLedger) -> Result<()> {
    let mut step = console.step("Retrain model");
    let model_path = archive.model_path();
    let report = FeedbackTrainer::default().fit_and_save(archive, ledger, &model_path)?;
    step.note(&format!(
        "{} example(s) from {} label(s)",
        report.examples, report.label_rows
    ));
    println!(
        "{}",
        serde_json::json!({
            "ok": true,
            "model": report,
            "model_path": model_path,
        })
    );
    Ok(())
}
