//! Clip descriptors and their per-clip visual effects.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::sequence::SequenceError;

/// One source video placed in the sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipDescriptor {
    /// Unique clip identifier.
    pub id: String,

    /// Path to the decodable source media.
    pub source: PathBuf,

    /// Intended start order. Clips are stably sorted by this key.
    #[serde(default)]
    pub order: u32,

    /// Natural duration of the source media in seconds.
    pub duration_secs: f64,

    /// Visual effects applied to this clip.
    #[serde(default)]
    pub effects: ClipEffects,
}

/// Effects carried by a single clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipEffects {
    /// Playback speed multiplier (2.0 plays twice as fast).
    pub speed: f64,

    /// Uniform blur standard deviation in output pixels (0 = off).
    pub blur_radius: f64,

    /// Region-limited blurs. When non-empty, `blur_radius` is ignored.
    pub selective_blur_regions: Vec<BlurRegion>,
}

/// A blurred area, in percent of the fitted content box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlurRegion {
    pub x_pct: f64,
    pub y_pct: f64,
    pub width_pct: f64,
    pub height_pct: f64,

    /// Clip path used inside the region box.
    #[serde(default)]
    pub shape: RegionShape,

    /// Blur standard deviation in output pixels.
    pub intensity: f64,
}

/// Clip path shape for a selective blur region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegionShape {
    #[default]
    Rect,
    /// Circle inscribed in the region box.
    Circle,
}

impl Default for ClipEffects {
    fn default() -> Self {
        Self {
            speed: 1.0,
            blur_radius: 0.0,
            selective_blur_regions: vec![],
        }
    }
}

impl ClipEffects {
    /// Uniform blur actually applied: selective regions suppress it.
    pub fn effective_global_blur(&self) -> Option<f64> {
        if self.selective_blur_regions.is_empty() && self.blur_radius > 0.0 {
            Some(self.blur_radius)
        } else {
            None
        }
    }
}

impl ClipDescriptor {
    /// Create a clip with default effects.
    pub fn new(id: impl Into<String>, source: impl Into<PathBuf>, duration_secs: f64) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            order: 0,
            duration_secs,
            effects: ClipEffects::default(),
        }
    }

    /// Builder-style speed setter.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.effects.speed = speed;
        self
    }

    /// Builder-style uniform blur setter.
    pub fn with_blur(mut self, radius: f64) -> Self {
        self.effects.blur_radius = radius;
        self
    }

    /// Builder-style selective region append.
    pub fn with_region(mut self, region: BlurRegion) -> Self {
        self.effects.selective_blur_regions.push(region);
        self
    }

    /// Contribution of this clip to the output timeline, in seconds.
    pub fn effective_duration(&self) -> f64 {
        self.duration_secs / self.effects.speed
    }

    /// Check the clip's own invariants.
    pub fn validate(&self) -> Result<(), SequenceError> {
        let invalid = |message: String| SequenceError::InvalidClip {
            clip_id: self.id.clone(),
            message,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("clip id must not be empty".to_string()));
        }
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return Err(invalid(format!(
                "duration must be positive, got {}",
                self.duration_secs
            )));
        }
        if !self.effects.speed.is_finite() || self.effects.speed <= 0.0 {
            return Err(invalid(format!(
                "speed multiplier must be positive, got {}",
                self.effects.speed
            )));
        }
        if !self.effective_duration().is_finite() {
            return Err(invalid(format!(
                "speed {} stretches the clip to a non-finite duration",
                self.effects.speed
            )));
        }
        if !self.effects.blur_radius.is_finite() || self.effects.blur_radius < 0.0 {
            return Err(invalid(format!(
                "blur radius must be non-negative, got {}",
                self.effects.blur_radius
            )));
        }

        for (idx, region) in self.effects.selective_blur_regions.iter().enumerate() {
            let coords = [
                region.x_pct,
                region.y_pct,
                region.width_pct,
                region.height_pct,
            ];
            if coords.iter().any(|v| !v.is_finite()) {
                return Err(invalid(format!("blur region {idx} has non-finite bounds")));
            }
            if region.width_pct < 0.0 || region.height_pct < 0.0 {
                return Err(invalid(format!("blur region {idx} has negative size")));
            }
            if !region.intensity.is_finite() || region.intensity < 0.0 {
                return Err(invalid(format!(
                    "blur region {idx} intensity must be non-negative"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_duration_applies_speed() {
        let clip = ClipDescriptor::new("a", "a.mp4", 10.0).with_speed(2.0);
        assert!((clip.effective_duration() - 5.0).abs() < 1e-9);

        let slow = ClipDescriptor::new("b", "b.mp4", 3.0).with_speed(0.5);
        assert!((slow.effective_duration() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_regions_suppress_global_blur() {
        let clip = ClipDescriptor::new("a", "a.mp4", 1.0).with_blur(6.0);
        assert_eq!(clip.effects.effective_global_blur(), Some(6.0));

        let clip = clip.with_region(BlurRegion {
            x_pct: 0.0,
            y_pct: 0.0,
            width_pct: 50.0,
            height_pct: 50.0,
            shape: RegionShape::Circle,
            intensity: 4.0,
        });
        assert_eq!(clip.effects.effective_global_blur(), None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ClipDescriptor::new("a", "a.mp4", 0.0).validate().is_err());
        assert!(ClipDescriptor::new("a", "a.mp4", 1.0)
            .with_speed(0.0)
            .validate()
            .is_err());
        assert!(ClipDescriptor::new("a", "a.mp4", 1.0)
            .with_blur(-1.0)
            .validate()
            .is_err());
        assert!(ClipDescriptor::new("", "a.mp4", 1.0).validate().is_err());
        assert!(ClipDescriptor::new("a", "a.mp4", f64::NAN).validate().is_err());
        // Subnormal speed overflows the effective duration.
        assert!(ClipDescriptor::new("a", "a.mp4", 1.0)
            .with_speed(1e-310)
            .validate()
            .is_err());
    }

    #[test]
    fn test_effects_deserialize_with_defaults() {
        let clip: ClipDescriptor = serde_json::from_str(
            r#"{ "id": "c1", "source": "clips/c1.mp4", "duration_secs": 4.0 }"#,
        )
        .unwrap();
        assert_eq!(clip.effects, ClipEffects::default());
        assert_eq!(clip.order, 0);

        let region: BlurRegion = serde_json::from_str(
            r#"{ "x_pct": 1, "y_pct": 2, "width_pct": 3, "height_pct": 4, "shape": "circle", "intensity": 5 }"#,
        )
        .unwrap();
        assert_eq!(region.shape, RegionShape::Circle);
    }
}
