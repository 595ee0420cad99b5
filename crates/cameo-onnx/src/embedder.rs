//! ArcFace-style embedding network via ONNX Runtime.
//!
//! Consumes the interleaved `(2n, 1, 128, 128)` batches built by the
//! core encoder and returns one 512-dimensional embedding per batch
//! item, order preserved.

use cameo_core::EmbeddingModel;
use ndarray::{Array2, ArrayView4};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

/// Native output dimension of the resnet-18 ArcFace export.
const EMBEDDING_DIM: usize = 512;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

impl From<ort::Error<ort::session::builder::SessionBuilder>> for EmbedderError {
    fn from(e: ort::Error<ort::session::builder::SessionBuilder>) -> Self {
        EmbedderError::Ort(e.into())
    }
}

#[derive(Debug)]
pub struct OnnxEmbedder {
    session: Session,
}

impl OnnxEmbedder {
    /// Load the embedding ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, EmbedderError> {
        if !Path::new(model_path).exists() {
            return Err(EmbedderError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded embedding model"
        );

        Ok(Self { session })
    }

    fn run(&mut self, batch: ArrayView4<f32>) -> Result<Array2<f32>, EmbedderError> {
        let rows = batch.shape()[0];

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(batch)?])?;

        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if data.len() != rows * EMBEDDING_DIM {
            return Err(EmbedderError::InferenceFailed(format!(
                "expected {rows}×{EMBEDDING_DIM} output, got {} values",
                data.len()
            )));
        }

        Array2::from_shape_vec((rows, EMBEDDING_DIM), data.to_vec())
            .map_err(|e| EmbedderError::InferenceFailed(e.to_string()))
    }
}

impl EmbeddingModel for OnnxEmbedder {
    fn embedding_dim(&self) -> usize {
        EMBEDDING_DIM
    }

    fn infer(&mut self, batch: ArrayView4<f32>) -> anyhow::Result<Array2<f32>> {
        Ok(self.run(batch)?)
    }
}
