//! cameo-onnx — ONNX Runtime implementations of the cameo-core
//! collaborator seams.
//!
//! Both models run on CPU via `ort`; the core treats them as blocking
//! black boxes.

pub mod detector;
pub mod embedder;

pub use detector::OnnxLandmarkDetector;
pub use embedder::OnnxEmbedder;
