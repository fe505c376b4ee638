//! The ordered clip sequence and its derived timing.
//!
//! A sequence is immutable once built: clips are stably sorted by their
//! intended start order and validated up front, and cumulative effective
//! durations partition the output timeline into contiguous segments.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::clip::ClipDescriptor;

/// Schema version written to sequence files.
pub const SEQUENCE_SCHEMA_VERSION: &str = "1.0";

/// An ordered, validated list of clips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SequenceFile", into = "SequenceFile")]
pub struct Sequence {
    name: String,
    clips: Vec<ClipDescriptor>,
}

/// On-disk representation of a sequence (`sequence.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceFile {
    /// Schema version.
    #[serde(default = "default_version")]
    pub version: String,

    /// Human-readable name.
    #[serde(default)]
    pub name: String,

    /// Clips in any order; sorted on load.
    pub clips: Vec<ClipDescriptor>,
}

/// A clip's slot on the output timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineSegment {
    /// Index of the clip within the sequence.
    pub clip_index: usize,
    /// Output time at which the clip starts (seconds).
    pub start_secs: f64,
    /// Output time the clip occupies (seconds).
    pub duration_secs: f64,
}

impl TimelineSegment {
    /// Exclusive end of the segment.
    pub fn end_secs(&self) -> f64 {
        self.start_secs + self.duration_secs
    }

    /// Half-open membership test.
    pub fn contains(&self, time_secs: f64) -> bool {
        self.start_secs <= time_secs && time_secs < self.end_secs()
    }
}

fn default_version() -> String {
    SEQUENCE_SCHEMA_VERSION.to_string()
}

impl Sequence {
    /// Build a sequence, sorting clips by start order and validating them.
    pub fn new(name: impl Into<String>, mut clips: Vec<ClipDescriptor>) -> Result<Self, SequenceError> {
        if clips.is_empty() {
            return Err(SequenceError::ValidationError {
                message: "sequence must contain at least one clip".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for clip in &clips {
            clip.validate()?;
            if !seen.insert(clip.id.as_str()) {
                return Err(SequenceError::ValidationError {
                    message: format!("duplicate clip id '{}'", clip.id),
                });
            }
        }

        clips.sort_by_key(|clip| clip.order);

        Ok(Self {
            name: name.into(),
            clips,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Clips in playback order.
    pub fn clips(&self) -> &[ClipDescriptor] {
        &self.clips
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Sum of effective durations, in output seconds.
    pub fn total_duration(&self) -> f64 {
        self.clips.iter().map(ClipDescriptor::effective_duration).sum()
    }

    /// Contiguous, non-overlapping timeline segments in playback order.
    pub fn segments(&self) -> Vec<TimelineSegment> {
        let mut start = 0.0;
        self.clips
            .iter()
            .enumerate()
            .map(|(clip_index, clip)| {
                let segment = TimelineSegment {
                    clip_index,
                    start_secs: start,
                    duration_secs: clip.effective_duration(),
                };
                start += segment.duration_secs;
                segment
            })
            .collect()
    }

    /// Resolve clip sources relative to `base` (for sequence files that use
    /// paths relative to their own directory).
    pub fn with_sources_relative_to(mut self, base: &Path) -> Self {
        for clip in &mut self.clips {
            if clip.source.is_relative() {
                clip.source = base.join(&clip.source);
            }
        }
        self
    }

    /// Load a sequence from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SequenceError> {
        let path = path.as_ref().to_path_buf();
        let json = std::fs::read_to_string(&path).map_err(|e| SequenceError::IoError {
            path: path.clone(),
            source: e,
        })?;
        let file: SequenceFile =
            serde_json::from_str(&json).map_err(|e| SequenceError::ParseError {
                path: path.clone(),
                source: e,
            })?;
        Self::try_from(file)
    }

    /// Save the sequence to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SequenceError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SequenceError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| SequenceError::ParseError {
            path: path.clone(),
            source: e,
        })?;
        std::fs::write(&path, json).map_err(|e| SequenceError::IoError { path, source: e })
    }

    /// List clips whose source file does not exist.
    pub fn missing_sources(&self) -> Vec<String> {
        self.clips
            .iter()
            .filter(|clip| !clip.source.exists())
            .map(|clip| format!("Clip '{}' source missing: {}", clip.id, clip.source.display()))
            .collect()
    }
}

impl TryFrom<SequenceFile> for Sequence {
    type Error = SequenceError;

    fn try_from(file: SequenceFile) -> Result<Self, Self::Error> {
        if file.version != SEQUENCE_SCHEMA_VERSION {
            return Err(SequenceError::ValidationError {
                message: format!(
                    "unsupported sequence version '{}' (expected {SEQUENCE_SCHEMA_VERSION})",
                    file.version
                ),
            });
        }
        Sequence::new(file.name, file.clips)
    }
}

impl From<Sequence> for SequenceFile {
    fn from(sequence: Sequence) -> Self {
        SequenceFile {
            version: SEQUENCE_SCHEMA_VERSION.to_string(),
            name: sequence.name,
            clips: sequence.clips,
        }
    }
}

/// Errors that can occur when building or loading sequences.
#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid clip '{clip_id}': {message}")]
    InvalidClip { clip_id: String, message: String },

    #[error("Invalid sequence: {message}")]
    ValidationError { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_clips() -> Vec<ClipDescriptor> {
        vec![
            ClipDescriptor::new("a", "a.mp4", 4.0),
            ClipDescriptor::new("b", "b.mp4", 2.0).with_speed(2.0),
        ]
    }

    #[test]
    fn test_segments_are_contiguous() {
        let sequence = Sequence::new("test", two_clips()).unwrap();
        let segments = sequence.segments();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].start_secs, 0.0);
        assert_eq!(segments[0].end_secs(), segments[1].start_secs);
        assert!((segments[1].duration_secs - 1.0).abs() < 1e-9);
        assert!((sequence.total_duration() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_segment_boundaries_are_half_open() {
        let sequence = Sequence::new("test", two_clips()).unwrap();
        let segments = sequence.segments();
        assert!(!segments[0].contains(4.0));
        assert!(segments[1].contains(4.0));
    }

    #[test]
    fn test_clips_sorted_by_order_stably() {
        let mut clips = vec![
            ClipDescriptor::new("late", "c.mp4", 1.0),
            ClipDescriptor::new("first", "a.mp4", 1.0),
            ClipDescriptor::new("second", "b.mp4", 1.0),
        ];
        clips[0].order = 2;
        clips[1].order = 0;
        clips[2].order = 0;

        let sequence = Sequence::new("ordered", clips).unwrap();
        let ids: Vec<_> = sequence.clips().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "late"]);
    }

    #[test]
    fn test_rejects_empty_and_duplicates() {
        assert!(Sequence::new("empty", vec![]).is_err());

        let dup = vec![
            ClipDescriptor::new("a", "a.mp4", 1.0),
            ClipDescriptor::new("a", "b.mp4", 1.0),
        ];
        let err = Sequence::new("dup", dup).unwrap_err();
        assert!(err.to_string().contains("duplicate clip id"));
    }

    #[test]
    fn test_deserialization_validates() {
        let bad = r#"{ "clips": [ { "id": "a", "source": "a.mp4", "duration_secs": -1 } ] }"#;
        assert!(serde_json::from_str::<Sequence>(bad).is_err());

        let good = r#"{ "name": "demo", "clips": [ { "id": "a", "source": "a.mp4", "duration_secs": 2 } ] }"#;
        let sequence: Sequence = serde_json::from_str(good).unwrap();
        assert_eq!(sequence.name(), "demo");
        assert_eq!(sequence.len(), 1);
    }

    #[test]
    fn test_relative_sources_resolve_against_base() {
        let sequence = Sequence::new("rel", vec![ClipDescriptor::new("a", "clips/a.mp4", 1.0)])
            .unwrap()
            .with_sources_relative_to(Path::new("/projects/demo"));
        assert_eq!(
            sequence.clips()[0].source,
            PathBuf::from("/projects/demo/clips/a.mp4")
        );
    }
}
