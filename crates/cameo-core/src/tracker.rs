//! Presence state machine — turns noisy per-tick decisions into clean
//! recording segments.
//!
//! Sampling only every Nth frame and smoothing over the last `m`
//! analyses absorbs single-tick misses from pose or occlusion without
//! merging genuinely separate appearances, at the cost of a tail of up
//! to `m` ticks after the subject leaves frame.

use crate::window::PresenceWindow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("presence window size must be at least 1")]
    ZeroWindowSize,
}

/// A finished recording segment: time bounds plus every identity seen
/// while it was open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Timestamp of the tick that opened the segment (seconds).
    pub start: f64,
    /// Timestamp of the tick that closed it (seconds).
    pub end: f64,
    pub labels: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Recording,
}

/// One tracker per video stream; ticks must be fed in timestamp order,
/// one at a time.
pub struct PresenceTracker {
    window: PresenceWindow,
    state: State,
    started_at: f64,
    detected: BTreeSet<String>,
}

impl PresenceTracker {
    pub fn new(window_size: usize) -> Result<Self, TrackerError> {
        if window_size == 0 {
            return Err(TrackerError::ZeroWindowSize);
        }
        Ok(Self {
            window: PresenceWindow::new(window_size),
            state: State::Idle,
            started_at: 0.0,
            detected: BTreeSet::new(),
        })
    }

    pub fn is_recording(&self) -> bool {
        self.state == State::Recording
    }

    /// Advance one analysis tick.
    ///
    /// `labels` is the matcher's result for the sampled frame; presence
    /// for the tick is simply its non-emptiness. Returns the finished
    /// segment when this tick empties the window while recording.
    pub fn tick(&mut self, timestamp: f64, labels: &BTreeSet<String>) -> Option<Segment> {
        let present = !labels.is_empty();
        self.window.push(present);
        let window_has_hit = self.window.any_hit();

        if window_has_hit && self.state == State::Idle {
            self.state = State::Recording;
            self.started_at = timestamp;
            tracing::info!(start = timestamp, "recording started");
        }

        if self.state == State::Recording && present {
            // Touch the set only when the tick brings a new label.
            if labels.iter().any(|label| !self.detected.contains(label)) {
                self.detected.extend(labels.iter().cloned());
                tracing::info!(labels = ?self.detected, "identities present in current segment");
            }
        }

        if !window_has_hit && self.state == State::Recording {
            return Some(self.close_segment(timestamp));
        }
        None
    }

    /// Stream-end flush: if still recording, close the open segment at
    /// the end-of-stream timestamp regardless of window contents.
    pub fn finish(&mut self, timestamp: f64) -> Option<Segment> {
        if self.state == State::Recording {
            Some(self.close_segment(timestamp))
        } else {
            None
        }
    }

    fn close_segment(&mut self, end: f64) -> Segment {
        self.state = State::Idle;
        let segment = Segment {
            start: self.started_at,
            end,
            labels: std::mem::take(&mut self.detected),
        };
        tracing::info!(
            start = segment.start,
            end = segment.end,
            labels = ?segment.labels,
            "recording stopped"
        );
        segment
    }
}
