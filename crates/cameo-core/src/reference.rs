//! Persisted reference set — ordered labels plus one representative
//! feature vector per label.
//!
//! Built once offline, read-only during live operation, shared across
//! streams via `Arc` without synchronization.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("label count {labels} does not match feature row count {rows}")]
    ShapeMismatch { labels: usize, rows: usize },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization: {0}")]
    Json(#[from] serde_json::Error),
}

/// Label list plus a parallel feature matrix; row `i` is the
/// representative vector for label `i`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceSet {
    labels: Vec<String>,
    features: Array2<f32>,
}

impl ReferenceSet {
    /// Invariant enforced here: one feature row per label.
    pub fn new(labels: Vec<String>, features: Array2<f32>) -> Result<Self, ReferenceError> {
        if labels.len() != features.nrows() {
            return Err(ReferenceError::ShapeMismatch {
                labels: labels.len(),
                rows: features.nrows(),
            });
        }
        Ok(Self { labels, features })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn feature_dim(&self) -> usize {
        self.features.ncols()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn features(&self) -> &Array2<f32> {
        &self.features
    }

    /// Serialize to a single JSON blob at `path`.
    pub fn save(&self, path: &Path) -> Result<(), ReferenceError> {
        let blob = serde_json::to_string(self)?;
        std::fs::write(path, blob)?;
        Ok(())
    }

    /// Load a reference set saved with [`save`](Self::save), re-checking
    /// the row/label invariant.
    pub fn load(path: &Path) -> Result<Self, ReferenceError> {
        let blob = std::fs::read_to_string(path)?;
        let parsed: Self = serde_json::from_str(&blob)?;
        Self::new(parsed.labels, parsed.features)
    }
}
