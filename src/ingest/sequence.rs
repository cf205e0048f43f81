//! Directory of still images played back as a clip.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::PathBuf;

use super::file::{FileConfig, FileStats, DEFAULT_FPS};
use crate::frame::Frame;

const EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub(crate) struct ImageSequenceSource {
    config: FileConfig,
    paths: Vec<PathBuf>,
    cursor: usize,
}

impl ImageSequenceSource {
    pub(crate) fn new(config: FileConfig) -> Self {
        Self {
            config,
            paths: Vec::new(),
            cursor: 0,
        }
    }

    pub(crate) fn connect(&mut self) -> Result<()> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.config.path)
            .with_context(|| format!("failed to list image directory {}", self.config.path))?
        {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image && path.is_file() {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Err(anyhow!("no PNG or JPEG frames in {}", self.config.path));
        }
        paths.sort();
        log::info!(
            "FileSource: connected to {} ({} image frames)",
            self.config.path,
            paths.len()
        );
        self.paths = paths;
        self.cursor = 0;
        Ok(())
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.paths.get(self.cursor) else {
            return Ok(None);
        };
        let image = image::open(path)
            .with_context(|| format!("failed to decode frame {}", path.display()))?
            .to_rgb8();
        let frame = Frame::from_rgb_image(self.cursor as u64, &image)?;
        self.cursor += 1;
        Ok(Some(frame))
    }

    pub(crate) fn fps(&self) -> f64 {
        self.config.fps.unwrap_or(DEFAULT_FPS)
    }

    pub(crate) fn stats(&self) -> FileStats {
        FileStats {
            frames_captured: self.cursor as u64,
            path: self.config.path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{FileSource, FrameSource};
    use image::{Rgb, RgbImage};

    #[test]
    fn plays_images_in_name_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        RgbImage::from_pixel(4, 2, Rgb([200, 10, 10])).save(dir.path().join("b.png"))?;
        RgbImage::from_pixel(4, 2, Rgb([10, 200, 10])).save(dir.path().join("a.png"))?;
        fs::write(dir.path().join("notes.txt"), "skip me")?;

        let mut source = FileSource::new(FileConfig::new(dir.path().to_string_lossy()))?;
        source.connect()?;
        let first = source.next_frame()?.expect("first frame");
        // Stored as BGR: green stays in the middle channel.
        assert_eq!(&first.pixels()[..3], &[10, 200, 10]);
        let second = source.next_frame()?.expect("second frame");
        assert_eq!(second.index, 1);
        assert_eq!(&second.pixels()[..3], &[10, 10, 200]);
        assert!(source.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn empty_directory_fails_to_connect() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut source = FileSource::new(FileConfig::new(dir.path().to_string_lossy()))?;
        assert!(source.connect().is_err());
        Ok(())
    }
}
