//! On-disk layout shared by analysis runs, label capture and training.
//!
//! ```text
//! <root>/
//!   model.json            shared model artifact
//!   labels.db             label ledger (SQLite)
//!   <run_id>/occurrences.json
//!   <run_id>/summary.json
//! ```

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::occurrence::{largest_on_frame, BBox, Evidence, Occurrence};
use crate::pipeline::RunSummary;

pub const OCCURRENCES_FILE: &str = "occurrences.json";
pub const SUMMARY_FILE: &str = "summary.json";
pub const MODEL_FILE: &str = "model.json";
pub const LEDGER_FILE: &str = "labels.db";

pub fn now_s() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

/// Directory tree holding one sub-directory per run.
#[derive(Clone, Debug)]
pub struct RunArchive {
    root: PathBuf,
}

impl RunArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Random 8-hex-digit run identifier.
    pub fn new_run_id() -> String {
        format!("{:08x}", rand::random::<u32>())
    }

    pub fn run_dir(&self, run_id: &str) -> Result<PathBuf> {
        validate_run_id(run_id)?;
        Ok(self.root.join(run_id))
    }

    pub fn model_path(&self) -> PathBuf {
        self.root.join(MODEL_FILE)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.root.join(LEDGER_FILE)
    }

    pub fn write_occurrences(&self, run_id: &str, occurrences: &[Occurrence]) -> Result<PathBuf> {
        let path = self.ensure_run_dir(run_id)?.join(OCCURRENCES_FILE);
        write_json(&path, occurrences)?;
        Ok(path)
    }

    /// `Ok(None)` when the run has no occurrence file.
    pub fn read_occurrences(&self, run_id: &str) -> Result<Option<Vec<Occurrence>>> {
        read_json(&self.run_dir(run_id)?.join(OCCURRENCES_FILE))
    }

    pub fn write_summary(&self, run_id: &str, summary: &RunSummary) -> Result<PathBuf> {
        let path = self.ensure_run_dir(run_id)?.join(SUMMARY_FILE);
        write_json(&path, summary)?;
        Ok(path)
    }

    pub fn read_summary(&self, run_id: &str) -> Result<Option<RunSummary>> {
        read_json(&self.run_dir(run_id)?.join(SUMMARY_FILE))
    }

    /// Run ids present on disk, sorted.
    pub fn list_runs(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut runs = Vec::new();
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("failed to list {}", self.root.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_run_id(name).is_ok() {
                    runs.push(name.to_string());
                }
            }
        }
        runs.sort();
        Ok(runs)
    }

    fn ensure_run_dir(&self, run_id: &str) -> Result<PathBuf> {
        let dir = self.run_dir(run_id)?;
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
        Ok(dir)
    }
}

fn validate_run_id(run_id: &str) -> Result<()> {
    let ok = !run_id.is_empty()
        && run_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(anyhow!("invalid run id {:?}", run_id))
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let value = serde_json::from_slice(&raw)
        .with_context(|| format!("malformed JSON in {}", path.display()))?;
    Ok(Some(value))
}

/// One reviewer verdict on a run frame.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelRow {
    pub run_id: String,
    pub ts: u64,
    pub frame: u64,
    pub time_s: Option<f64>,
    /// Flat type text of the judged occurrence, e.g. `low_signal|possible_false_positive`.
    pub kind: Option<String>,
    pub label: String,
    pub bbox: Option<BBox>,
    pub evidence: Option<Evidence>,
}

impl LabelRow {
    /// Verdict for `frame`, copying context from the judged occurrence when known.
    pub fn capture(
        run_id: &str,
        frame: u64,
        label: &str,
        ts: u64,
        judged: Option<&Occurrence>,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            ts,
            frame,
            time_s: judged.map(|o| o.time_s),
            kind: judged.map(|o| o.kind.to_string()),
            label: label.trim().to_string(),
            bbox: judged.map(|o| o.bbox),
            evidence: judged.map(|o| o.evidence.clone()),
        }
    }
}

/// Append-only store of reviewer verdicts.
pub trait LabelLedger {
    fn append(&mut self, row: &LabelRow) -> Result<()>;

    /// Runs with at least one label, sorted.
    fn runs(&self) -> Result<Vec<String>>;

    /// Labels of one run in insertion order.
    fn labels_for_run(&self, run_id: &str) -> Result<Vec<LabelRow>>;

    fn count(&self) -> Result<usize>;
}

pub struct SqliteLabelLedger {
    conn: Connection,
}

impl SqliteLabelLedger {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open label ledger {}", db_path.display()))?;
        let mut ledger = Self { conn };
        ledger.ensure_schema()?;
        Ok(ledger)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS labels (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              run_id TEXT NOT NULL,
              ts INTEGER NOT NULL,
              frame INTEGER NOT NULL,
              time_s REAL,
              kind TEXT,
              label TEXT NOT NULL,
              bbox_json TEXT,
              evidence_json TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_labels_run ON labels(run_id);
            "#,
        )?;
        Ok(())
    }
}

impl LabelLedger for SqliteLabelLedger {
    fn append(&mut self, row: &LabelRow) -> Result<()> {
        let ts = i64::try_from(row.ts).map_err(|_| anyhow!("timestamp exceeds i64 range"))?;
        let frame =
            i64::try_from(row.frame).map_err(|_| anyhow!("frame index exceeds i64 range"))?;
        let bbox_json = row.bbox.map(|b| serde_json::to_string(&b)).transpose()?;
        let evidence_json = row
            .evidence
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn.execute(
            r#"
            INSERT INTO labels(run_id, ts, frame, time_s, kind, label, bbox_json, evidence_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                row.run_id,
                ts,
                frame,
                row.time_s,
                row.kind,
                row.label,
                bbox_json,
                evidence_json
            ],
        )?;
        Ok(())
    }

    fn runs(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT run_id FROM labels ORDER BY run_id ASC")?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(row.get(0)?);
        }
        Ok(out)
    }

    fn labels_for_run(&self, run_id: &str) -> Result<Vec<LabelRow>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT ts, frame, time_s, kind, label, bbox_json, evidence_json
            FROM labels WHERE run_id = ?1 ORDER BY id ASC
            "#,
        )?;
        let mut rows = stmt.query(params![run_id])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let ts: i64 = row.get(0)?;
            let frame: i64 = row.get(1)?;
            let bbox_json: Option<String> = row.get(5)?;
            let evidence_json: Option<String> = row.get(6)?;
            out.push(LabelRow {
                run_id: run_id.to_string(),
                ts: u64::try_from(ts).map_err(|_| anyhow!("corrupt label: negative ts"))?,
                frame: u64::try_from(frame)
                    .map_err(|_| anyhow!("corrupt label: negative frame"))?,
                time_s: row.get(2)?,
                kind: row.get(3)?,
                label: row.get(4)?,
                bbox: bbox_json
                    .map(|raw| serde_json::from_str(&raw))
                    .transpose()
                    .map_err(|e| anyhow!("corrupt label bbox in run {}: {}", run_id, e))?,
                evidence: evidence_json
                    .map(|raw| serde_json::from_str(&raw))
                    .transpose()
                    .map_err(|e| anyhow!("corrupt label evidence in run {}: {}", run_id, e))?,
            });
        }
        Ok(out)
    }

    fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM labels", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryLabelLedger {
    rows: Vec<LabelRow>,
}

impl LabelLedger for InMemoryLabelLedger {
    fn append(&mut self, row: &LabelRow) -> Result<()> {
        self.rows.push(row.clone());
        Ok(())
    }

    fn runs(&self) -> Result<Vec<String>> {
        let mut runs: Vec<String> = self.rows.iter().map(|r| r.run_id.clone()).collect();
        runs.sort();
        runs.dedup();
        Ok(runs)
    }

    fn labels_for_run(&self, run_id: &str) -> Result<Vec<LabelRow>> {
        Ok(self
            .rows
            .iter()
            .filter(|r| r.run_id == run_id)
            .cloned()
            .collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.rows.len())
    }
}

/// Append a reviewer verdict for `frame` of `run_id`.
///
/// The run id must name a valid archive directory. Context comes from the
/// largest occurrence on that frame; a run without a readable occurrence file
/// still records the bare verdict.
pub fn record_label(
    archive: &RunArchive,
    ledger: &mut dyn LabelLedger,
    run_id: &str,
    frame: u64,
    label: &str,
    ts: u64,
) -> Result<LabelRow> {
    archive.run_dir(run_id)?;
    let occurrences = match archive.read_occurrences(run_id) {
        Ok(occurrences) => occurrences.unwrap_or_default(),
        Err(e) => {
            log::warn!("run {}: occurrences unreadable: {:#}", run_id, e);
            Vec::new()
        }
    };
    let judged = largest_on_frame(&occurrences, frame);
    if judged.is_none() {
        log::warn!("run {}: no occurrence on frame {}", run_id, frame);
    }
    let row = LabelRow::capture(run_id, frame, label, ts, judged);
    ledger.append(&row)?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occurrence::{OccurrenceKind, StressClass};

    fn occurrence(frame: u64, area_px: u64) -> Occurrence {
        Occurrence {
            run_id: Some("run1".to_string()),
            frame,
            time_s: frame as f64 / 30.0,
            bbox: BBox::from([1, 2, 30, 40]),
            area_px,
            kind: OccurrenceKind::new(StressClass::LowSignal),
            confidence: 80,
            recommendation: "monitor".to_string(),
            evidence: Evidence {
                vari: Some(-0.1),
                ..Evidence::default()
            },
            ml: None,
        }
    }

    fn exercise_ledger(ledger: &mut dyn LabelLedger) -> Result<()> {
        let occ = occurrence(30, 900);
        ledger.append(&LabelRow::capture("b-run", 30, " confirm ", 100, Some(&occ)))?;
        ledger.append(&LabelRow::capture("a-run", 60, "fp", 101, None))?;
        ledger.append(&LabelRow::capture("b-run", 90, "pos", 102, None))?;

        assert_eq!(ledger.count()?, 3);
        assert_eq!(ledger.runs()?, vec!["a-run".to_string(), "b-run".to_string()]);
        let rows = ledger.labels_for_run("b-run")?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].label, "confirm");
        assert_eq!(rows[0].kind.as_deref(), Some("low_signal"));
        assert_eq!(rows[0].bbox, Some(BBox::from([1, 2, 30, 40])));
        assert_eq!(rows[0].evidence.as_ref().and_then(|e| e.vari), Some(-0.1));
        assert_eq!(rows[1].frame, 90);
        assert!(rows[1].bbox.is_none());
        Ok(())
    }

    #[test]
    fn sqlite_ledger_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(LEDGER_FILE);
        {
            let mut ledger = SqliteLabelLedger::open(&path)?;
            exercise_ledger(&mut ledger)?;
        }
        let reopened = SqliteLabelLedger::open(&path)?;
        assert_eq!(reopened.count()?, 3);
        Ok(())
    }

    #[test]
    fn in_memory_ledger_round_trip() -> Result<()> {
        exercise_ledger(&mut InMemoryLabelLedger::default())
    }

    #[test]
    fn archive_writes_and_lists_runs() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let archive = RunArchive::new(dir.path());
        assert!(archive.list_runs()?.is_empty());
        assert!(archive.read_occurrences("run1")?.is_none());

        let occs = vec![occurrence(30, 900), occurrence(60, 1200)];
        archive.write_occurrences("run1", &occs)?;
        archive.write_occurrences("run0", &[])?;
        assert_eq!(archive.read_occurrences("run1")?, Some(occs));
        assert_eq!(archive.list_runs()?, vec!["run0".to_string(), "run1".to_string()]);
        assert_eq!(archive.model_path(), dir.path().join("model.json"));
        Ok(())
    }

    #[test]
    fn malformed_occurrence_file_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let archive = RunArchive::new(dir.path());
        let run_dir = archive.run_dir("broken")?;
        fs::create_dir_all(&run_dir)?;
        fs::write(run_dir.join(OCCURRENCES_FILE), b"[{\"frame\": ")?;
        assert!(archive.read_occurrences("broken").is_err());
        Ok(())
    }

    #[test]
    fn run_ids_cannot_escape_the_archive() {
        let archive = RunArchive::new("/tmp/runs");
        assert!(archive.run_dir("../etc").is_err());
        assert!(archive.run_dir("").is_err());
        assert_eq!(RunArchive::new_run_id().len(), 8);
    }

    #[test]
    fn labels_copy_context_from_the_largest_occurrence() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let archive = RunArchive::new(dir.path());
        archive.write_occurrences("run1", &[occurrence(30, 900), occurrence(30, 1500)])?;
        let mut ledger = InMemoryLabelLedger::default();

        let row = record_label(&archive, &mut ledger, "run1", 30, "confirm", 7)?;
        assert_eq!(row.ts, 7);
        assert_eq!(row.time_s, Some(1.0));
        assert_eq!(row.kind.as_deref(), Some("low_signal"));

        let bare = record_label(&archive, &mut ledger, "run1", 99, "fp", 8)?;
        assert!(bare.bbox.is_none());
        assert_eq!(ledger.count()?, 2);
        Ok(())
    }

    #[test]
    fn invalid_run_id_is_never_recorded() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let archive = RunArchive::new(dir.path());
        let mut ledger = InMemoryLabelLedger::default();

        assert!(record_label(&archive, &mut ledger, "../x", 0, "confirm", 1).is_err());
        assert!(record_label(&archive, &mut ledger, "", 0, "confirm", 1).is_err());
        assert_eq!(ledger.count()?, 0);
        Ok(())
    }
}
