//! Local frame source.
//!
//! `FileSource` picks a backend from the path:
//! - `stub://<scene>`: synthetic frames for tests and demos
//! - a directory: image sequence
//! - anything else: video file decoded with FFmpeg (feature: ingest-ffmpeg)
//!
//! Remote URLs are rejected.

use anyhow::{anyhow, Result};
use std::path::Path;

#[cfg(feature = "ingest-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::sequence::ImageSequenceSource;
use super::FrameSource;
use crate::frame::Frame;

pub const DEFAULT_FPS: f64 = 30.0;

/// Healthy canopy, BGR.
pub const GREEN_BGR: [u8; 3] = [40, 180, 60];
/// Bare earth inside a canopy, BGR.
pub const EARTH_BGR: [u8; 3] = [60, 90, 140];
/// Dry soil covering a whole field, BGR.
pub const DRY_SOIL_BGR: [u8; 3] = [70, 80, 150];

/// Configuration for a local source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local path, directory, or `stub://` scene.
    pub path: String,
    /// Frame rate override. Video files report their own rate otherwise.
    pub fps: Option<f64>,
    /// Number of frames a synthetic scene produces.
    pub frame_count: u64,
    /// Synthetic frame size.
    pub width: u32,
    pub height: u32,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            fps: None,
            frame_count: 90,
            width: 640,
            height: 480,
        }
    }
}

impl FileConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// Local frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    Sequence(ImageSequenceSource),
    #[cfg(feature = "ingest-ffmpeg")]
    Ffmpeg(Box<FfmpegFileSource>),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        if let Some(fps) = config.fps {
            if !(fps.is_finite() && fps > 0.0) {
                return Err(anyhow!("fps must be a positive number (got {})", fps));
            }
        }
        if let Some(scene) = config.path.strip_prefix("stub://") {
            let scene = SyntheticScene::parse(scene)?;
            return Ok(Self {
                backend: FileBackend::Synthetic(SyntheticFileSource::new(config, scene)),
            });
        }
        if Path::new(&config.path).is_dir() {
            return Ok(Self {
                backend: FileBackend::Sequence(ImageSequenceSource::new(config)),
            });
        }
        #[cfg(feature = "ingest-ffmpeg")]
        {
            Ok(Self {
                backend: FileBackend::Ffmpeg(Box::new(FfmpegFileSource::new(config)?)),
            })
        }
        #[cfg(not(feature = "ingest-ffmpeg"))]
        {
            Err(anyhow!(
                "video file ingestion requires the ingest-ffmpeg feature ({})",
                config.path
            ))
        }
    }

    /// Get frame statistics.
    pub fn stats(&self) -> FileStats {
        match &self.backend {
            FileBackend::Synthetic(source) => source.stats(),
            FileBackend::Sequence(source) => source.stats(),
            #[cfg(feature = "ingest-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.stats(),
        }
    }
}

impl FrameSource for FileSource {
    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.connect(),
            FileBackend::Sequence(source) => source.connect(),
            #[cfg(feature = "ingest-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            FileBackend::Sequence(source) => source.next_frame(),
            #[cfg(feature = "ingest-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn fps(&self) -> f64 {
        match &self.backend {
            FileBackend::Synthetic(source) => source.fps(),
            FileBackend::Sequence(source) => source.fps(),
            #[cfg(feature = "ingest-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.fps(),
        }
    }
}

/// Statistics for a file source.
#[derive(Clone, Debug)]
pub struct FileStats {
    pub frames_captured: u64,
    pub path: String,
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SyntheticScene {
    /// Uniform healthy canopy.
    Green,
    /// Canopy with a centred bare-earth patch covering just over half the frame.
    SoilPatch,
    /// Dry soil edge to edge.
    BareSoil,
}

impl SyntheticScene {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "green" => Ok(Self::Green),
            "soil-patch" => Ok(Self::SoilPatch),
            "bare-soil" => Ok(Self::BareSoil),
            other => Err(anyhow!(
                "unknown synthetic scene {:?} (expected green, soil-patch or bare-soil)",
                other
            )),
        }
    }
}

struct SyntheticFileSource {
    config: FileConfig,
    scene: SyntheticScene,
    frame_count: u64,
}

impl SyntheticFileSource {
    fn new(config: FileConfig, scene: SyntheticScene) -> Self {
        Self {
            config,
            scene,
            frame_count: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        if self.config.width == 0 || self.config.height == 0 {
            return Err(anyhow!("synthetic frames need a non-zero size"));
        }
        log::info!("FileSource: connected to {} (synthetic)", self.config.path);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.frame_count >= self.config.frame_count {
            return Ok(None);
        }
        let index = self.frame_count;
        self.frame_count += 1;

        let (w, h) = (self.config.width, self.config.height);
        let frame = match self.scene {
            SyntheticScene::Green => Frame::solid(index, w, h, GREEN_BGR)?,
            SyntheticScene::BareSoil => Frame::solid(index, w, h, DRY_SOIL_BGR)?,
            SyntheticScene::SoilPatch => {
                let mut frame = Frame::solid(index, w, h, GREEN_BGR)?;
                let (pw, ph) = (w * 3 / 4, h * 3 / 4);
                frame.fill_rect((w - pw) / 2, (h - ph) / 2, pw, ph, EARTH_BGR);
                frame
            }
        };
        Ok(Some(frame))
    }

    fn fps(&self) -> f64 {
        self.config.fps.unwrap_or(DEFAULT_FPS)
    }

    fn stats(&self) -> FileStats {
        FileStats {
            frames_captured: self.frame_count,
            path: self.config.path.clone(),
        }
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}
