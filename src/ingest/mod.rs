//! Frame ingestion sources.
//!
//! Every source yields full-resolution frames in stream order and reports its
//! nominal frame rate:
//! - synthetic scenes (`stub://green`, `stub://soil-patch`, `stub://bare-soil`)
//! - image-sequence directories (PNG/JPEG, lexicographic order)
//! - local video files (feature: ingest-ffmpeg)
//!
//! Sources are finite and forward-only; `Ok(None)` marks exhaustion.

pub mod file;
#[cfg(feature = "ingest-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub(crate) mod sequence;

use anyhow::Result;

use crate::frame::Frame;

pub use file::{FileConfig, FileSource, FileStats};

pub trait FrameSource {
    /// Open the underlying stream. Failure here is fatal for a run.
    fn connect(&mut self) -> Result<()>;

    /// Next frame in stream order, `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Nominal frames per second.
    fn fps(&self) -> f64;
}
