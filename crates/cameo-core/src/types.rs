//! Shared data model and the collaborator seams the pipeline calls into.

use crate::tracker::Segment;
use ndarray::{Array2, ArrayView4};
use serde::{Deserialize, Serialize};

/// A single grayscale video frame, row-major, one byte per pixel.
#[derive(Clone)]
pub struct GrayFrame {
    /// Pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Axis-aligned face bounding box in frame coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One detected face in one frame. Consumed immediately by the pipeline.
#[derive(Debug, Clone)]
pub struct FaceDetection {
    pub bbox: BoundingBox,
    /// Five-point facial landmarks:
    /// [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: [(f32, f32); 5],
    pub confidence: f32,
}

/// Pair up a flat 10-scalar landmark buffer.
///
/// The fixed packing is five x-coordinates followed by five
/// y-coordinates, i.e. `(flat[i], flat[i + 5])` is point `i`.
pub fn landmarks_from_flat(flat: &[f32; 10]) -> [(f32, f32); 5] {
    std::array::from_fn(|i| (flat[i], flat[i + 5]))
}

/// Face/landmark detector, consumed as a black box.
///
/// An `Ok` empty vec is a legitimate "no faces this frame"; an `Err` is a
/// detection failure the caller logs and skips without touching any
/// presence state.
pub trait FaceDetector {
    fn detect(&mut self, frame: &GrayFrame) -> anyhow::Result<Vec<FaceDetection>>;
}

/// Embedding network, consumed as a black box.
///
/// `infer` takes a `(batch, 1, 128, 128)` float tensor and returns one
/// `embedding_dim`-length vector per batch item, order preserved,
/// deterministic for identical input.
pub trait EmbeddingModel {
    /// Native output dimension of the network (per input image).
    fn embedding_dim(&self) -> usize;

    fn infer(&mut self, batch: ArrayView4<f32>) -> anyhow::Result<Array2<f32>>;
}

/// Supplies `(timestamp, frame)` pairs in monotonically increasing
/// timestamp order (seconds). `Ok(None)` is the explicit end-of-stream
/// signal; it is never inferred from errors.
pub trait FrameSource {
    fn next_frame(&mut self) -> anyhow::Result<Option<(f64, GrayFrame)>>;
}

/// Receives finished recording segments. The sink is handed the time
/// bounds and the accumulated label set; materializing a clipped video
/// file from them is its business, not the pipeline's.
pub trait RecordingSink {
    fn write_segment(&mut self, segment: &Segment) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landmarks_from_flat_pairing() {
        let flat = [1.0, 2.0, 3.0, 4.0, 5.0, 10.0, 20.0, 30.0, 40.0, 50.0];
        let points = landmarks_from_flat(&flat);
        assert_eq!(points[0], (1.0, 10.0));
        assert_eq!(points[2], (3.0, 30.0));
        assert_eq!(points[4], (5.0, 50.0));
    }
}
