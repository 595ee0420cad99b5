//! Face/landmark detector via ONNX Runtime.
//!
//! Consumes a landmark-equipped detector export as a black box: the
//! model takes a fixed-size frame and returns final detections — an
//! `(N, 5)` box tensor `[x1, y1, x2, y2, score]` plus an `(N, 10)`
//! landmark tensor (five x-coordinates then five y-coordinates, both in
//! model input space). No anchor decoding happens here.

use cameo_core::types::{landmarks_from_flat, BoundingBox, FaceDetection, GrayFrame};
use cameo_core::FaceDetector;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const DETECTOR_INPUT_SIZE: usize = 320;
const DETECTOR_MEAN: f32 = 127.5;
const DETECTOR_STD: f32 = 128.0;
const DETECTOR_CONFIDENCE_THRESHOLD: f32 = 0.6;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

impl From<ort::Error<ort::session::builder::SessionBuilder>> for DetectorError {
    fn from(e: ort::Error<ort::session::builder::SessionBuilder>) -> Self {
        DetectorError::Ort(e.into())
    }
}

#[derive(Debug)]
pub struct OnnxLandmarkDetector {
    session: Session,
}

impl OnnxLandmarkDetector {
    /// Load the detector ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded landmark detector"
        );

        Ok(Self { session })
    }

    fn run(&mut self, frame: &GrayFrame) -> Result<Vec<FaceDetection>, DetectorError> {
        let input = preprocess(frame);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, boxes) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("boxes: {e}")))?;
        let (_, landmarks) = outputs[1]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("landmarks: {e}")))?;

        let scale_x = frame.width as f32 / DETECTOR_INPUT_SIZE as f32;
        let scale_y = frame.height as f32 / DETECTOR_INPUT_SIZE as f32;

        Ok(decode_outputs(
            boxes,
            landmarks,
            scale_x,
            scale_y,
            DETECTOR_CONFIDENCE_THRESHOLD,
        ))
    }
}

impl FaceDetector for OnnxLandmarkDetector {
    fn detect(&mut self, frame: &GrayFrame) -> anyhow::Result<Vec<FaceDetection>> {
        Ok(self.run(frame)?)
    }
}

/// Stretch-resize the grayscale frame to the model input and normalize
/// into a `(1, 3, S, S)` NCHW tensor (grayscale replicated across the
/// three channels).
fn preprocess(frame: &GrayFrame) -> Array4<f32> {
    let size = DETECTOR_INPUT_SIZE;
    let src_w = frame.width as usize;
    let src_h = frame.height as usize;
    let x_ratio = src_w as f32 / size as f32;
    let y_ratio = src_h as f32 / size as f32;

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for y in 0..size {
        let src_y = (y as f32 + 0.5) * y_ratio - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, src_h as i32 - 1) as usize;
        let y1 = (y0 + 1).min(src_h - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..size {
            let src_x = (x as f32 + 0.5) * x_ratio - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, src_w as i32 - 1) as usize;
            let x1 = (x0 + 1).min(src_w - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            let tl = frame.data[y0 * src_w + x0] as f32;
            let tr = frame.data[y0 * src_w + x1] as f32;
            let bl = frame.data[y1 * src_w + x0] as f32;
            let br = frame.data[y1 * src_w + x1] as f32;

            let val = tl * (1.0 - fx) * (1.0 - fy)
                + tr * fx * (1.0 - fy)
                + bl * (1.0 - fx) * fy
                + br * fx * fy;

            let normalized = (val - DETECTOR_MEAN) / DETECTOR_STD;
            tensor[[0, 0, y, x]] = normalized;
            tensor[[0, 1, y, x]] = normalized;
            tensor[[0, 2, y, x]] = normalized;
        }
    }

    tensor
}

/// Filter model detections by confidence and map coordinates from model
/// input space back to frame space.
fn decode_outputs(
    boxes: &[f32],
    landmarks: &[f32],
    scale_x: f32,
    scale_y: f32,
    threshold: f32,
) -> Vec<FaceDetection> {
    let count = boxes.len() / 5;
    let mut detections = Vec::new();

    for i in 0..count {
        let b = &boxes[i * 5..i * 5 + 5];
        let score = b[4];
        if score < threshold {
            continue;
        }

        let lm_off = i * 10;
        if lm_off + 10 > landmarks.len() {
            break;
        }
        let mut flat = [0.0f32; 10];
        for j in 0..5 {
            flat[j] = landmarks[lm_off + j] * scale_x;
            flat[j + 5] = landmarks[lm_off + 5 + j] * scale_y;
        }

        detections.push(FaceDetection {
            bbox: BoundingBox {
                x: b[0] * scale_x,
                y: b[1] * scale_y,
                width: (b[2] - b[0]) * scale_x,
                height: (b[3] - b[1]) * scale_y,
            },
            landmarks: landmarks_from_flat(&flat),
            confidence: score,
        });
    }

    detections
}
