//! stderr progress for the command-line tools.
//!
//! Stdout carries the machine-readable JSON result, so everything here goes to
//! stderr. Spinners are used only on a terminal, and only when stdout is also
//! a terminal in `auto` mode (piped JSON stays clean of redraw noise).

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::time::{Duration, Instant};

const PLAIN_PROGRESS_EVERY: Duration = Duration::from_secs(5);

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UiMode {
    #[default]
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Copy, Debug)]
pub struct Console {
    spinners: bool,
}

impl Console {
    pub fn detect(mode: UiMode) -> Self {
        let stderr_tty = std::io::stderr().is_terminal();
        let stdout_tty = std::io::stdout().is_terminal();
        Self::with_terminals(mode, stderr_tty, stdout_tty)
    }

    fn with_terminals(mode: UiMode, stderr_tty: bool, stdout_tty: bool) -> Self {
        let spinners = stderr_tty
            && match mode {
                UiMode::Pretty => true,
                UiMode::Auto => stdout_tty,
                UiMode::Plain => false,
            };
        Self { spinners }
    }

    /// Start a named step; it reports its duration when dropped.
    pub fn step(&self, name: &str) -> Step {
        let spinner = self.spinners.then(|| {
            let spinner = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
            spinner.set_style(
                ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            spinner.enable_steady_tick(Duration::from_millis(120));
            spinner.set_message(name.to_string());
            spinner
        });
        if spinner.is_none() {
            eprintln!("==> {}", name);
        }
        Step {
            name: name.to_string(),
            started: Instant::now(),
            last_note: None,
            spinner,
        }
    }
}

pub struct Step {
    name: String,
    started: Instant,
    last_note: Option<Instant>,
    spinner: Option<ProgressBar>,
}

impl Step {
    /// Show how far the step has got. Plain output is throttled.
    pub fn note(&mut self, detail: &str) {
        if let Some(spinner) = &self.spinner {
            spinner.set_message(format!("{}: {}", self.name, detail));
            return;
        }
        if self
            .last_note
            .map_or(true, |at| at.elapsed() >= PLAIN_PROGRESS_EVERY)
        {
            eprintln!("    {}", detail);
            self.last_note = Some(Instant::now());
        }
    }
}

impl Drop for Step {
    fn drop(&mut self) {
        let line = format!("✔ {} ({})", self.name, human_duration(self.started.elapsed()));
        match &self.spinner {
            Some(spinner) => spinner.finish_with_message(line),
            None => eprintln!("{line}"),
        }
    }
}

fn human_duration(d: Duration) -> String {
    match d.as_millis() {
        ms if ms < 1000 => format!("{ms}ms"),
        _ => format!("{:.2}s", d.as_secs_f64()),
    }
}
