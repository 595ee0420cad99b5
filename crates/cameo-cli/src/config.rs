//! Pipeline configuration, loaded from a TOML file.
//!
//! Every knob is an explicit value handed to the components at
//! construction; nothing reads ambient process-wide state.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CameoConfig {
    /// Analyze every nth frame of the stream.
    pub nth_frame: u32,
    /// Keep recording while any of the last m analyses saw a target.
    pub window_size: usize,
    /// Cosine distance threshold for a positive identity match.
    pub threshold: f32,
    /// Path to the landmark detector ONNX model.
    pub detector_model: PathBuf,
    /// Path to the embedding ONNX model.
    pub embedder_model: PathBuf,
}

impl Default for CameoConfig {
    fn default() -> Self {
        Self {
            nth_frame: 30,
            window_size: 15,
            threshold: 0.65,
            detector_model: PathBuf::from("models/landmark_det.onnx"),
            embedder_model: PathBuf::from("models/arcface_r18.onnx"),
        }
    }
}

impl CameoConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nth_frame == 0 {
            bail!("nth_frame must be at least 1");
        }
        if self.window_size == 0 {
            bail!("window_size must be at least 1");
        }
        if !(self.threshold > 0.0 && self.threshold <= 2.0) {
            bail!(
                "threshold must be in (0, 2], got {} (cosine distance range)",
                self.threshold
            );
        }
        Ok(())
    }
}
