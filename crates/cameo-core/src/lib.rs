//! cameo-core — identity-presence pipeline for video streams.
//!
//! Aligns detected faces to a canonical pose, encodes them into
//! flip-concatenated feature vectors, matches those against a reference
//! set of known identities, and smooths the per-tick decisions into
//! recording segments via an explicit state machine.
//!
//! Face/landmark detection and the embedding network are consumed as
//! black boxes through the [`types::FaceDetector`] and
//! [`types::EmbeddingModel`] seams.

pub mod alignment;
pub mod builder;
pub mod encoder;
pub mod matcher;
pub mod processor;
pub mod reference;
pub mod tracker;
pub mod types;
pub mod window;

pub use builder::ReferenceBuilder;
pub use encoder::FeatureEncoder;
pub use matcher::{IdentityMatcher, DEFAULT_MATCH_THRESHOLD};
pub use processor::{ProcessStats, VideoProcessor};
pub use reference::ReferenceSet;
pub use tracker::{PresenceTracker, Segment};
pub use types::{
    BoundingBox, EmbeddingModel, FaceDetection, FaceDetector, FrameSource, GrayFrame,
    RecordingSink,
};
