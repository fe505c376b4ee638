//! Frame scheduling: global output frame index to (clip, local source time).

use clipweave_common::error::{ClipweaveError, ClipweaveResult};
use clipweave_sequence_model::sequence::{Sequence, TimelineSegment};

/// Keeps local times strictly inside the source so seeks never land past
/// end-of-media.
pub const LOCAL_TIME_EPSILON_SECS: f64 = 0.001;

/// Slack, in frames, absorbed before rounding the frame count up. Summed
/// clip durations carry float error that would otherwise add a frame.
const FRAME_COUNT_EPSILON: f64 = 1e-6;

/// Largest frame count a schedule may hold.
pub const MAX_TOTAL_FRAMES: u64 = u32::MAX as u64;

/// One resolved output frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSlot {
    /// Global output frame index.
    pub index: u64,

    /// Output time in seconds (`index / fps`).
    pub global_time: f64,

    /// Index of the owning clip within the sequence.
    pub clip_index: usize,

    /// Output time elapsed since the owning clip started.
    pub relative_time: f64,

    /// Source time to seek to within the owning clip.
    pub local_time: f64,
}

/// Per-clip timing needed to resolve frames.
#[derive(Debug, Clone, Copy)]
struct ScheduledClip {
    segment: TimelineSegment,
    speed: f64,
    natural_duration: f64,
}

/// Maps output frame indices onto clips of an immutable sequence.
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    fps: u32,
    clips: Vec<ScheduledClip>,
    total_duration: f64,
    total_frames: u64,
}

impl FrameScheduler {
    /// Build the schedule for `sequence` at `fps` frames per second.
    pub fn new(sequence: &Sequence, fps: u32) -> ClipweaveResult<Self> {
        if fps == 0 {
            return Err(ClipweaveError::invalid_settings("fps must be positive"));
        }
        if sequence.is_empty() {
            return Err(ClipweaveError::invalid_sequence(
                "cannot schedule an empty sequence",
            ));
        }

        let clips: Vec<ScheduledClip> = sequence
            .segments()
            .into_iter()
            .zip(sequence.clips())
            .map(|(segment, clip)| ScheduledClip {
                segment,
                speed: clip.effects.speed,
                natural_duration: clip.duration_secs,
            })
            .collect();

        let total_duration = sequence.total_duration();
        if !total_duration.is_finite() {
            return Err(ClipweaveError::invalid_sequence(format!(
                "total duration is not finite ({total_duration})"
            )));
        }
        let exact_frames = (total_duration * fps as f64 - FRAME_COUNT_EPSILON).ceil().max(0.0);
        if exact_frames > MAX_TOTAL_FRAMES as f64 {
            return Err(ClipweaveError::invalid_sequence(format!(
                "{total_duration}s at {fps} fps exceeds {MAX_TOTAL_FRAMES} frames"
            )));
        }
        let total_frames = exact_frames as u64;

        tracing::debug!(
            clips = clips.len(),
            fps,
            total_duration,
            total_frames,
            "Frame schedule built"
        );

        Ok(Self {
            fps,
            clips,
            total_duration,
            total_frames,
        })
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Sum of effective clip durations in seconds.
    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    /// Number of output frames: `ceil(total_duration * fps)`.
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Timeline segments in playback order.
    pub fn segments(&self) -> impl Iterator<Item = &TimelineSegment> + '_ {
        self.clips.iter().map(|clip| &clip.segment)
    }

    /// Resolve output frame `index` to its clip and local source time.
    pub fn resolve(&self, index: u64) -> FrameSlot {
        let global_time = index as f64 / self.fps as f64;

        let clip_index = self
            .clips
            .iter()
            .position(|clip| clip.segment.contains(global_time))
            .unwrap_or(self.clips.len() - 1);
        let clip = &self.clips[clip_index];

        let relative_time = (global_time - clip.segment.start_secs).max(0.0);
        let max_local = (clip.natural_duration - LOCAL_TIME_EPSILON_SECS).max(0.0);
        let local_time = (relative_time * clip.speed).clamp(0.0, max_local);

        FrameSlot {
            index,
            global_time,
            clip_index,
            relative_time,
            local_time,
        }
    }

    /// Iterate over every output frame in order.
    pub fn slots(&self) -> impl Iterator<Item = FrameSlot> + '_ {
        (0..self.total_frames).map(move |index| self.resolve(index))
    }
}
