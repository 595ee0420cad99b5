//! Per-tick pipeline driver — frame source in, recording segments out.
//!
//! Logically single-threaded and synchronous: detection, alignment,
//! encoding and matching for a tick complete before its presence
//! decision commits, and no overlap with I/O is attempted. One
//! processor per video stream; the reference set behind the matcher is
//! the only state shared across streams.

use crate::encoder::{EncoderError, FeatureEncoder};
use crate::matcher::{IdentityMatcher, MatchError};
use crate::tracker::{PresenceTracker, TrackerError};
use crate::types::{EmbeddingModel, FaceDetector, FrameSource, RecordingSink};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("frame sampling interval must be at least 1")]
    ZeroSampleInterval,
    #[error("frame source failed: {0}")]
    Source(anyhow::Error),
    #[error("recording sink failed: {0}")]
    Sink(anyhow::Error),
    #[error(transparent)]
    Encoder(#[from] EncoderError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

/// Counters for one processed stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessStats {
    /// Frames pulled from the source.
    pub frames: u64,
    /// Analysis ticks, including ones skipped on detector failure.
    pub ticks: u64,
    /// Ticks skipped because the detector errored.
    pub detection_failures: u64,
    /// Segments handed to the sink, stream-end flush included.
    pub segments: u64,
}

/// Drives detect → align → encode → match → track over a sampled frame
/// stream and emits finished segments to the sink.
pub struct VideoProcessor<D: FaceDetector, M: EmbeddingModel> {
    detector: D,
    encoder: FeatureEncoder<M>,
    matcher: IdentityMatcher,
    tracker: PresenceTracker,
    nth_frame: u32,
}

impl<D: FaceDetector, M: EmbeddingModel> VideoProcessor<D, M> {
    /// `nth_frame` is the sampling interval (1 = analyze every frame),
    /// `window_size` the presence-smoothing depth in analysis ticks.
    pub fn new(
        detector: D,
        encoder: FeatureEncoder<M>,
        matcher: IdentityMatcher,
        nth_frame: u32,
        window_size: usize,
    ) -> Result<Self, ProcessError> {
        if nth_frame == 0 {
            return Err(ProcessError::ZeroSampleInterval);
        }
        Ok(Self {
            detector,
            encoder,
            matcher,
            tracker: PresenceTracker::new(window_size)?,
            nth_frame,
        })
    }

    /// Consume the whole stream. Per analysis tick, a detector failure
    /// is logged and contributes nothing — the presence window is left
    /// untouched rather than fed a false miss. Dimension mismatches and
    /// sink failures abort the run.
    pub fn process<F, S>(&mut self, source: &mut F, sink: &mut S) -> Result<ProcessStats, ProcessError>
    where
        F: FrameSource,
        S: RecordingSink,
    {
        let mut stats = ProcessStats::default();
        let mut countdown = self.nth_frame;
        let mut last_timestamp = 0.0f64;

        while let Some((timestamp, frame)) = source.next_frame().map_err(ProcessError::Source)? {
            stats.frames += 1;
            last_timestamp = timestamp;

            countdown -= 1;
            if countdown > 0 {
                continue;
            }
            countdown = self.nth_frame;
            stats.ticks += 1;

            let faces = match self.detector.detect(&frame) {
                Ok(faces) => faces,
                Err(err) => {
                    stats.detection_failures += 1;
                    tracing::warn!(
                        timestamp,
                        error = %err,
                        "detector failed, skipping this analysis tick"
                    );
                    continue;
                }
            };

            let labels = if faces.is_empty() {
                BTreeSet::new()
            } else {
                let features = self.encoder.extract(&frame, &faces)?;
                self.matcher.match_labels(features.view())?
            };

            if let Some(segment) = self.tracker.tick(timestamp, &labels) {
                stats.segments += 1;
                sink.write_segment(&segment).map_err(ProcessError::Sink)?;
            }
        }

        // End-of-stream flush for a still-open segment.
        if let Some(segment) = self.tracker.finish(last_timestamp) {
            stats.segments += 1;
            sink.write_segment(&segment).map_err(ProcessError::Sink)?;
        }

        tracing::info!(
            frames = stats.frames,
            ticks = stats.ticks,
            failures = stats.detection_failures,
            segments = stats.segments,
            "stream processed"
        );
        Ok(stats)
    }
}
