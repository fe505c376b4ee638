//! Clock and timing utilities for paced frame presentation.
//!
//! The live-capture export path hands frames to a recorder at the
//! output frame rate. Deadlines are computed from a fixed epoch so that
//! scheduling error never accumulates across frames. This module provides:
//! - The presentation clock and its per-frame deadlines
//! - Drift measurement between planned and actual presentation
//! - A wall-clock stamp of when presentation started, for logs

use std::time::{Duration, Instant};

/// A presentation clock that yields absolute per-frame deadlines
/// relative to a fixed epoch (the moment presentation started).
#[derive(Debug, Clone)]
pub struct PresentationClock {
    /// The instant presentation started.
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,

    /// Nominal interval between frames in nanoseconds.
    interval_ns: u64,
}

impl PresentationClock {
    /// Create a new clock anchored to now, targeting `fps` frames per second.
    pub fn start(fps: u32) -> Self {
        Self::from_epoch(Instant::now(), fps)
    }

    /// Create a clock from a known epoch.
    pub fn from_epoch(epoch: Instant, fps: u32) -> Self {
        Self {
            epoch,
            epoch_wall: chrono::Utc::now().to_rfc3339(),
            interval_ns: 1_000_000_000 / fps.max(1) as u64,
        }
    }

    /// Absolute deadline at which `frame_index` should be presented.
    pub fn deadline(&self, frame_index: u64) -> Instant {
        self.epoch + Duration::from_nanos(frame_index.saturating_mul(self.interval_ns))
    }

    /// Measure how far `presented_at` is from the planned deadline of `frame_index`.
    pub fn drift(&self, frame_index: u64, presented_at: Instant) -> DriftMeasurement {
        DriftMeasurement {
            reference_ns: frame_index.saturating_mul(self.interval_ns),
            measured_ns: presented_at.saturating_duration_since(self.epoch).as_nanos() as u64,
        }
    }

    /// Time elapsed since presentation start.
    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    /// Wall-clock time at presentation start (RFC 3339).
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }

    /// Nominal presentation time of `frames` frames.
    pub fn nominal(&self, frames: u64) -> Duration {
        Duration::from_nanos(frames.saturating_mul(self.interval_ns))
    }

    /// Target interval between frames.
    pub fn interval(&self) -> Duration {
        Duration::from_nanos(self.interval_ns)
    }
}

/// Drift measurement between a planned and an actual timestamp.
#[derive(Debug, Clone, Copy)]
pub struct DriftMeasurement {
    /// Planned timestamp (ns since epoch).
    pub reference_ns: u64,
    /// Actual timestamp (ns since epoch).
    pub measured_ns: u64,
}

impl DriftMeasurement {
    /// Drift in nanoseconds (positive = measured is late).
    pub fn drift_ns(&self) -> i64 {
        self.measured_ns as i64 - self.reference_ns as i64
    }

    /// Drift in milliseconds.
    pub fn drift_ms(&self) -> f64 {
        self.drift_ns() as f64 / 1_000_000.0
    }

    /// Whether drift exceeds an acceptable threshold.
    pub fn exceeds_threshold_ms(&self, threshold_ms: f64) -> bool {
        self.drift_ms().abs() > threshold_ms
    }
}
