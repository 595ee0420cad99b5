//! Frame source over a directory of still images.
//!
//! Stands in for a decoded video stream: files are visited in
//! lexicographic order and timestamped at a fixed frame rate. Actual
//! video decoding stays outside the pipeline.

use anyhow::{bail, Context, Result};
use cameo_core::{FrameSource, GrayFrame};
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

pub struct ImageDirSource {
    files: Vec<PathBuf>,
    next: usize,
    fps: f64,
}

impl ImageDirSource {
    pub fn open(dir: &Path, fps: f64) -> Result<Self> {
        if fps <= 0.0 {
            bail!("fps must be positive, got {fps}");
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("reading frame directory {}", dir.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            bail!("no frame images found in {}", dir.display());
        }

        tracing::info!(frames = files.len(), fps, dir = %dir.display(), "frame source opened");
        Ok(Self {
            files,
            next: 0,
            fps,
        })
    }
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Result<Option<(f64, GrayFrame)>> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        let index = self.next;
        self.next += 1;

        let gray = image::open(path)
            .with_context(|| format!("decoding frame {}", path.display()))?
            .to_luma8();
        let (width, height) = gray.dimensions();

        Ok(Some((
            index as f64 / self.fps,
            GrayFrame {
                data: gray.into_raw(),
                width,
                height,
            },
        )))
    }
}
