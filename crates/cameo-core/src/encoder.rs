//! Feature encoding — aligned face to flip-concatenated feature vector.
//!
//! This module is the single aligner+encoder path shared by the live
//! pipeline and the offline reference builder; the preprocessing here
//! replicates the embedding network's training-time normalization and
//! must not be duplicated elsewhere.

use crate::alignment::{self, AlignmentError, ALIGNED_SIZE};
use crate::types::{EmbeddingModel, FaceDetection, GrayFrame};
use ndarray::{s, Array2, Array4};
use thiserror::Error;

const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 127.5;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("embedding model failed: {0}")]
    Model(anyhow::Error),
    #[error("embedding model returned shape ({got_rows}, {got_cols}), expected ({rows}, {cols})")]
    OutputShape {
        rows: usize,
        cols: usize,
        got_rows: usize,
        got_cols: usize,
    },
}

/// Mirror a 128×128 aligned face around its vertical axis.
fn mirror_horizontal(face: &[u8]) -> Vec<u8> {
    let mut flipped = vec![0u8; face.len()];
    for y in 0..ALIGNED_SIZE {
        let row = y * ALIGNED_SIZE;
        for x in 0..ALIGNED_SIZE {
            flipped[row + x] = face[row + (ALIGNED_SIZE - 1 - x)];
        }
    }
    flipped
}

/// Build the interleaved inference batch for `n` aligned faces.
///
/// Shape `(2n, 1, 128, 128)`: batch item `2i` is face `i`, item `2i + 1`
/// is its horizontal mirror. Pixels are normalized `(v − 127.5) / 127.5`
/// into roughly [−1, 1]. The interleaving order is a fixed contract with
/// [`FeatureEncoder::encode`]'s de-interleave step — reordering either
/// side silently produces wrong feature vectors.
fn build_batch(faces: &[Vec<u8>]) -> Array4<f32> {
    let mut batch = Array4::<f32>::zeros((2 * faces.len(), 1, ALIGNED_SIZE, ALIGNED_SIZE));

    for (i, face) in faces.iter().enumerate() {
        let mirror = mirror_horizontal(face);
        for (plane, pixels) in [(2 * i, face.as_slice()), (2 * i + 1, mirror.as_slice())] {
            for y in 0..ALIGNED_SIZE {
                for x in 0..ALIGNED_SIZE {
                    batch[[plane, 0, y, x]] =
                        (pixels[y * ALIGNED_SIZE + x] as f32 - PIXEL_MEAN) / PIXEL_STD;
                }
            }
        }
    }

    batch
}

/// Turns aligned faces into identity feature vectors via the embedding
/// black box. The final vector is the network output for the face
/// concatenated with the output for its mirror, so the feature dimension
/// is always exactly twice the network's native dimension.
pub struct FeatureEncoder<M: EmbeddingModel> {
    model: M,
}

impl<M: EmbeddingModel> FeatureEncoder<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    /// Dimension of the feature vectors this encoder produces.
    pub fn feature_dim(&self) -> usize {
        2 * self.model.embedding_dim()
    }

    /// Encode a batch of 128×128 aligned faces into an `(n, feature_dim)`
    /// matrix, row `i` for face `i`.
    ///
    /// An empty input yields a `(0, feature_dim)` matrix without
    /// touching the model.
    pub fn encode(&mut self, faces: &[Vec<u8>]) -> Result<Array2<f32>, EncoderError> {
        let n = faces.len();
        let dim = self.model.embedding_dim();
        if n == 0 {
            return Ok(Array2::zeros((0, 2 * dim)));
        }

        let batch = build_batch(faces);
        let output = self.model.infer(batch.view()).map_err(EncoderError::Model)?;

        if output.nrows() != 2 * n || output.ncols() != dim {
            return Err(EncoderError::OutputShape {
                rows: 2 * n,
                cols: dim,
                got_rows: output.nrows(),
                got_cols: output.ncols(),
            });
        }

        // De-interleave: even rows are the originals, odd rows the
        // mirrors; concatenate per face.
        let mut features = Array2::<f32>::zeros((n, 2 * dim));
        for i in 0..n {
            features.slice_mut(s![i, ..dim]).assign(&output.row(2 * i));
            features.slice_mut(s![i, dim..]).assign(&output.row(2 * i + 1));
        }

        Ok(features)
    }

    /// Align every detection in `frame` and encode the survivors.
    ///
    /// A face with degenerate landmark geometry is logged and skipped;
    /// the remaining faces in the frame continue. Row order of the
    /// result follows input order of the surviving detections.
    pub fn extract(
        &mut self,
        frame: &GrayFrame,
        detections: &[FaceDetection],
    ) -> Result<Array2<f32>, EncoderError> {
        let mut aligned = Vec::with_capacity(detections.len());
        for (i, det) in detections.iter().enumerate() {
            match alignment::align_face(frame, &det.landmarks) {
                Ok(face) => aligned.push(face),
                Err(AlignmentError::DegenerateLandmarks) => {
                    tracing::warn!(face = i, "degenerate landmarks, skipping face");
                }
            }
        }
        self.encode(&aligned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;
    use ndarray::ArrayView4;

    /// Model stub: embedding row `j` of the output is filled with the
    /// mean of input plane `j`, padded with the plane index. Records
    /// every batch it sees.
    struct StubModel {
        dim: usize,
        calls: usize,
        last_batch: Option<Array4<f32>>,
    }

    impl StubModel {
        fn new(dim: usize) -> Self {
            Self {
                dim,
                calls: 0,
                last_batch: None,
            }
        }
    }

    impl EmbeddingModel for StubModel {
        fn embedding_dim(&self) -> usize {
            self.dim
        }

        fn infer(&mut self, batch: ArrayView4<f32>) -> anyhow::Result<Array2<f32>> {
            self.calls += 1;
            self.last_batch = Some(batch.to_owned());
            let rows = batch.shape()[0];
            let mut out = Array2::<f32>::zeros((rows, self.dim));
            for j in 0..rows {
                let plane = batch.slice(s![j, 0, .., ..]);
                let mean = plane.iter().sum::<f32>() / plane.len() as f32;
                out[[j, 0]] = mean;
                for c in 1..self.dim {
                    out[[j, c]] = j as f32;
                }
            }
            Ok(out)
        }
    }

    fn face_with_value(value: u8) -> Vec<u8> {
        vec![value; ALIGNED_SIZE * ALIGNED_SIZE]
    }

    /// Left half dark, right half bright — mirroring changes the plane.
    fn half_and_half_face() -> Vec<u8> {
        let mut face = vec![0u8; ALIGNED_SIZE * ALIGNED_SIZE];
        for y in 0..ALIGNED_SIZE {
            for x in ALIGNED_SIZE / 2..ALIGNED_SIZE {
                face[y * ALIGNED_SIZE + x] = 255;
            }
        }
        face
    }

    #[test]
    fn test_feature_dim_is_twice_native() {
        let encoder = FeatureEncoder::new(StubModel::new(7));
        assert_eq!(encoder.feature_dim(), 14);
    }

    #[test]
    fn test_encode_shapes_for_all_batch_sizes() {
        let mut encoder = FeatureEncoder::new(StubModel::new(4));
        for n in 1..4usize {
            let faces: Vec<Vec<u8>> = (0..n).map(|i| face_with_value(i as u8)).collect();
            let features = encoder.encode(&faces).unwrap();
            assert_eq!(features.dim(), (n, 8));
        }
    }

    #[test]
    fn test_encode_empty_skips_model() {
        let mut encoder = FeatureEncoder::new(StubModel::new(4));
        let features = encoder.encode(&[]).unwrap();
        assert_eq!(features.dim(), (0, 8));
        assert_eq!(encoder.model.calls, 0);
    }

    #[test]
    fn test_normalization_range() {
        let mut encoder = FeatureEncoder::new(StubModel::new(2));
        encoder.encode(&[face_with_value(0)]).unwrap();
        let batch = encoder.model.last_batch.take().unwrap();
        assert!((batch[[0, 0, 0, 0]] + 1.0).abs() < 1e-6);

        encoder.encode(&[face_with_value(255)]).unwrap();
        let batch = encoder.model.last_batch.take().unwrap();
        assert!((batch[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_batch_interleaving_order() {
        let mut encoder = FeatureEncoder::new(StubModel::new(2));
        encoder
            .encode(&[half_and_half_face(), face_with_value(255)])
            .unwrap();
        let batch = encoder.model.last_batch.take().unwrap();
        assert_eq!(batch.shape(), &[4, 1, ALIGNED_SIZE, ALIGNED_SIZE]);

        // Face 0 original: left edge dark. Its mirror at plane 1: left
        // edge bright. Face 1 occupies planes 2 and 3.
        assert!((batch[[0, 0, 0, 0]] + 1.0).abs() < 1e-6);
        assert!((batch[[1, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((batch[[2, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((batch[[3, 0, 0, 0]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_deinterleave_concatenation() {
        // Stub pads columns 1.. with the plane index, so face i must see
        // 2i in its first half and 2i+1 in its second half.
        let mut encoder = FeatureEncoder::new(StubModel::new(3));
        let features = encoder
            .encode(&[face_with_value(10), face_with_value(20)])
            .unwrap();
        assert_eq!(features.dim(), (2, 6));
        assert_eq!(features[[0, 1]], 0.0);
        assert_eq!(features[[0, 4]], 1.0);
        assert_eq!(features[[1, 1]], 2.0);
        assert_eq!(features[[1, 4]], 3.0);
    }

    #[test]
    fn test_extract_skips_degenerate_faces() {
        let frame = GrayFrame {
            data: vec![128u8; 200 * 200],
            width: 200,
            height: 200,
        };
        let good = FaceDetection {
            bbox: BoundingBox {
                x: 60.0,
                y: 40.0,
                width: 80.0,
                height: 90.0,
            },
            landmarks: [
                (80.0, 60.0),
                (120.0, 60.0),
                (100.0, 85.0),
                (85.0, 110.0),
                (115.0, 110.0),
            ],
            confidence: 0.9,
        };
        let degenerate = FaceDetection {
            landmarks: [(50.0, 50.0); 5],
            ..good.clone()
        };

        let mut encoder = FeatureEncoder::new(StubModel::new(2));
        let features = encoder
            .extract(&frame, &[good, degenerate])
            .unwrap();
        assert_eq!(features.nrows(), 1);
    }
}
