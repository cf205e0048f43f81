use anyhow::Result;
use tempfile::TempDir;

use vegwatch::{
    pipeline, AnalysisConfig, FileConfig, FileSource, RunArchive, RunSummary, StressClass,
};

fn stub(scene: &str, frames: u64) -> Result<FileSource> {
    FileSource::new(FileConfig {
        path: format!("stub://{}", scene),
        frame_count: frames,
        ..FileConfig::default()
    })
}

fn config(stride: u32) -> AnalysisConfig {
    let mut cfg = AnalysisConfig::default();
    cfg.sample_stride = stride;
    cfg.detector.agree_k = 2;
    cfg.detector.min_area = 100.0;
    cfg
}

#[test]
fn healthy_canopy_yields_nothing() -> Result<()> {
    let mut source = stub("green", 60)?;
    let result = pipeline::run(&mut source, &config(30), None)?;

    assert!(result.occurrences.is_empty());
    assert_eq!(result.summary.frames_seen, 60);
    assert_eq!(result.summary.frames_processed, 2);
    assert_eq!(result.summary.soil_skipped, 0);
    Ok(())
}

#[test]
fn soil_patch_is_flagged_once_per_sampled_frame() -> Result<()> {
    let mut source = stub("soil-patch", 90)?;
    let result = pipeline::run(&mut source, &config(30), Some("e2e00001"))?;

    let frames: Vec<u64> = result.occurrences.iter().map(|o| o.frame).collect();
    assert_eq!(frames, vec![0, 30, 60]);

    for occ in &result.occurrences {
        assert_eq!(occ.run_id.as_deref(), Some("e2e00001"));
        assert_eq!(occ.kind.base, StressClass::LowSignal);
        assert!(occ.evidence.severity.unwrap_or(0.0) > 0.9);
        assert!(occ.confidence == 80 || occ.confidence == 92);

        // 640x480 frame, earth patch 480x360 at (80, 60).
        assert!((occ.bbox.x - 80).abs() <= 2, "x {}", occ.bbox.x);
        assert!((occ.bbox.y - 60).abs() <= 2, "y {}", occ.bbox.y);
        assert!((occ.bbox.w - 480).abs() <= 4, "w {}", occ.bbox.w);
        assert!((occ.bbox.h - 360).abs() <= 4, "h {}", occ.bbox.h);
        assert!(occ.area_px > 100_000);
    }
    assert!((result.occurrences[1].time_s - 1.0).abs() < 1e-9);
    Ok(())
}

#[test]
fn bare_soil_frames_are_skipped_by_the_guard() -> Result<()> {
    let mut source = stub("bare-soil", 30)?;
    let result = pipeline::run(&mut source, &config(10), None)?;

    assert!(result.occurrences.is_empty());
    assert_eq!(result.summary.frames_processed, 3);
    assert_eq!(result.summary.soil_skipped, 3);

    let mut source = stub("bare-soil", 30)?;
    let mut cfg = config(10);
    cfg.detector.soil_guard_enabled = false;
    let result = pipeline::run(&mut source, &cfg, None)?;
    assert_eq!(result.occurrences.len(), 3);
    assert_eq!(result.summary.soil_skipped, 0);
    Ok(())
}

#[test]
fn archived_run_reads_back() -> Result<()> {
    let dir = TempDir::new()?;
    let archive = RunArchive::new(dir.path());
    let run_id = RunArchive::new_run_id();

    let mut source = stub("soil-patch", 30)?;
    let result = pipeline::run(&mut source, &config(15), Some(&run_id))?;
    assert_eq!(result.occurrences.len(), 2);

    archive.write_occurrences(&run_id, &result.occurrences)?;
    archive.write_summary(&run_id, &result.summary)?;

    let occurrences = archive.read_occurrences(&run_id)?.expect("occurrences written");
    assert_eq!(occurrences.len(), result.occurrences.len());
    for (read, written) in occurrences.iter().zip(&result.occurrences) {
        assert_eq!(read.frame, written.frame);
        assert_eq!(read.bbox, written.bbox);
        assert_eq!(read.area_px, written.area_px);
        assert_eq!(read.kind, written.kind);
        assert_eq!(read.confidence, written.confidence);
        assert_eq!(read.run_id.as_deref(), Some(run_id.as_str()));
    }
    let summary: RunSummary = archive.read_summary(&run_id)?.expect("summary written");
    assert_eq!(summary, result.summary);
    assert_eq!(archive.list_runs()?, vec![run_id]);
    Ok(())
}

#[test]
fn unknown_stub_scene_is_rejected() {
    assert!(stub("desert", 10).is_err());
}
