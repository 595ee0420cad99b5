//! Offline reference builder — labeled image dataset to reference set.
//!
//! Runs the same aligner+encoder path as the live pipeline over one
//! directory of images per identity and reduces each identity's
//! per-image feature vectors to their component-wise mean.

use crate::encoder::{EncoderError, FeatureEncoder};
use crate::reference::{ReferenceError, ReferenceSet};
use crate::types::{EmbeddingModel, FaceDetector, GrayFrame};
use ndarray::{Array1, Array2};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("failed to read dataset directory {path}: {source}")]
    DatasetIo {
        path: String,
        source: std::io::Error,
    },
    #[error("dataset contains no identity directories")]
    EmptyDataset,
    #[error("no usable images for label(s): {}", labels.join(", "))]
    NoUsableImages { labels: Vec<String> },
    #[error(transparent)]
    Encoder(#[from] EncoderError),
    #[error(transparent)]
    Reference(#[from] ReferenceError),
}

/// Builds a [`ReferenceSet`] with a borrowed detector and the shared
/// feature encoder, so offline references and live queries cannot
/// diverge in preprocessing.
pub struct ReferenceBuilder<'a, D: FaceDetector, M: EmbeddingModel> {
    detector: &'a mut D,
    encoder: &'a mut FeatureEncoder<M>,
}

impl<'a, D: FaceDetector, M: EmbeddingModel> ReferenceBuilder<'a, D, M> {
    pub fn new(detector: &'a mut D, encoder: &'a mut FeatureEncoder<M>) -> Self {
        Self { detector, encoder }
    }

    /// Walk `dataset_dir` — one subdirectory per identity, directory
    /// name as label — and build the reference set. Labels are processed
    /// in lexicographic order for a deterministic result.
    pub fn build(&mut self, dataset_dir: &Path) -> Result<ReferenceSet, BuildError> {
        let read_dir = |path: &Path| {
            std::fs::read_dir(path).map_err(|source| BuildError::DatasetIo {
                path: path.display().to_string(),
                source,
            })
        };

        let mut identity_dirs: Vec<_> = read_dir(dataset_dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        identity_dirs.sort();

        if identity_dirs.is_empty() {
            return Err(BuildError::EmptyDataset);
        }

        let mut labeled = Vec::with_capacity(identity_dirs.len());
        for dir in identity_dirs {
            let label = dir
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            let mut image_paths: Vec<_> = read_dir(&dir)?
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|path| path.is_file())
                .collect();
            image_paths.sort();

            let mut frames = Vec::with_capacity(image_paths.len());
            for path in image_paths {
                match image::open(&path) {
                    Ok(img) => {
                        let gray = img.to_luma8();
                        let (width, height) = gray.dimensions();
                        frames.push(GrayFrame {
                            data: gray.into_raw(),
                            width,
                            height,
                        });
                    }
                    Err(err) => {
                        tracing::warn!(path = %path.display(), error = %err, "unreadable image, skipping");
                    }
                }
            }

            labeled.push((label, frames));
        }

        self.build_from_frames(&labeled)
    }

    /// Core of the build, decoupled from the filesystem: one entry per
    /// label with that identity's frames.
    ///
    /// Per frame: zero faces or more than one face → reported and
    /// skipped (an extra face cannot be attributed to the label); a
    /// detector failure on one frame skips that frame only. A label
    /// ending with zero usable frames is recorded; the remaining labels
    /// still build, and the whole pass then fails naming every such
    /// label — a silently thinner reference set is worse than no set.
    pub fn build_from_frames(
        &mut self,
        labeled: &[(String, Vec<GrayFrame>)],
    ) -> Result<ReferenceSet, BuildError> {
        let dim = self.encoder.feature_dim();
        let mut labels = Vec::new();
        let mut rows: Vec<Array1<f32>> = Vec::new();
        let mut unusable = Vec::new();

        for (label, frames) in labeled {
            let mut sum = Array1::<f32>::zeros(dim);
            let mut used = 0usize;

            for (i, frame) in frames.iter().enumerate() {
                let faces = match self.detector.detect(frame) {
                    Ok(faces) => faces,
                    Err(err) => {
                        tracing::warn!(label = %label, frame = i, error = %err, "detector failed, skipping image");
                        continue;
                    }
                };
                match faces.len() {
                    0 => {
                        tracing::warn!(label = %label, frame = i, "no face found, skipping image");
                        continue;
                    }
                    1 => {}
                    n => {
                        tracing::warn!(label = %label, frame = i, faces = n, "ambiguous image with multiple faces, skipping");
                        continue;
                    }
                }

                let features = self.encoder.extract(frame, &faces)?;
                if features.nrows() == 0 {
                    // Sole face had degenerate landmarks.
                    continue;
                }
                sum += &features.row(0);
                used += 1;
            }

            if used == 0 {
                tracing::error!(label = %label, "no usable images for label");
                unusable.push(label.clone());
                continue;
            }

            tracing::info!(label = %label, images = used, "label references built");
            labels.push(label.clone());
            rows.push(sum / used as f32);
        }

        if !unusable.is_empty() {
            return Err(BuildError::NoUsableImages { labels: unusable });
        }

        let mut features = Array2::<f32>::zeros((rows.len(), dim));
        for (i, row) in rows.iter().enumerate() {
            features.row_mut(i).assign(row);
        }

        Ok(ReferenceSet::new(labels, features)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment;
    use crate::types::{BoundingBox, FaceDetection};
    use ndarray::{s, Array2, ArrayView4};

    /// Detector stub keyed on frame brightness: 0 → no face,
    /// 1 → one face at canonical landmarks, 2 → two faces, 3 → error.
    struct ScriptedDetector;

    fn canonical_detection() -> FaceDetection {
        FaceDetection {
            bbox: BoundingBox {
                x: 20.0,
                y: 20.0,
                width: 100.0,
                height: 110.0,
            },
            landmarks: alignment::reference_landmarks(),
            confidence: 0.95,
        }
    }

    impl FaceDetector for ScriptedDetector {
        fn detect(&mut self, frame: &GrayFrame) -> anyhow::Result<Vec<FaceDetection>> {
            match frame.data[0] {
                0 => Ok(vec![]),
                1 => Ok(vec![canonical_detection()]),
                2 => Ok(vec![canonical_detection(), canonical_detection()]),
                _ => Err(anyhow::anyhow!("scripted detector failure")),
            }
        }
    }

    /// Embeds every plane as its mean pixel value, repeated.
    struct MeanModel {
        dim: usize,
    }

    impl EmbeddingModel for MeanModel {
        fn embedding_dim(&self) -> usize {
            self.dim
        }

        fn infer(&mut self, batch: ArrayView4<f32>) -> anyhow::Result<Array2<f32>> {
            let rows = batch.shape()[0];
            let mut out = Array2::<f32>::zeros((rows, self.dim));
            for j in 0..rows {
                let plane = batch.slice(s![j, 0, .., ..]);
                let mean = plane.iter().sum::<f32>() / plane.len() as f32;
                out.row_mut(j).fill(mean);
            }
            Ok(out)
        }
    }

    fn frame(marker: u8) -> GrayFrame {
        GrayFrame {
            data: vec![marker; 200 * 200],
            width: 200,
            height: 200,
        }
    }

    #[test]
    fn test_build_means_usable_images_only() {
        let mut detector = ScriptedDetector;
        let mut encoder = FeatureEncoder::new(MeanModel { dim: 3 });
        let mut builder = ReferenceBuilder::new(&mut detector, &mut encoder);

        // Two usable frames, one blank, one two-face, one failing.
        let dataset = vec![(
            "alice".to_string(),
            vec![frame(1), frame(0), frame(2), frame(3), frame(1)],
        )];
        let refs = builder.build_from_frames(&dataset).unwrap();

        assert_eq!(refs.labels(), &["alice".to_string()]);
        assert_eq!(refs.features().dim(), (1, 6));
        // Both usable frames are identical, so the mean equals either.
        let expected = (1.0 - 127.5) / 127.5;
        for &v in refs.features().row(0) {
            assert!((v - expected).abs() < 1e-5, "got {v}");
        }
    }

    #[test]
    fn test_unusable_label_fails_after_full_pass() {
        let mut detector = ScriptedDetector;
        let mut encoder = FeatureEncoder::new(MeanModel { dim: 2 });
        let mut builder = ReferenceBuilder::new(&mut detector, &mut encoder);

        let dataset = vec![
            ("alice".to_string(), vec![frame(1)]),
            ("ghost".to_string(), vec![frame(0), frame(3)]),
        ];
        let err = builder.build_from_frames(&dataset).unwrap_err();
        match err {
            BuildError::NoUsableImages { labels } => {
                assert_eq!(labels, vec!["ghost".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_label_order_preserved() {
        let mut detector = ScriptedDetector;
        let mut encoder = FeatureEncoder::new(MeanModel { dim: 2 });
        let mut builder = ReferenceBuilder::new(&mut detector, &mut encoder);

        let dataset = vec![
            ("zed".to_string(), vec![frame(1)]),
            ("alice".to_string(), vec![frame(1)]),
        ];
        let refs = builder.build_from_frames(&dataset).unwrap();
        assert_eq!(refs.labels(), &["zed".to_string(), "alice".to_string()]);
    }
}
