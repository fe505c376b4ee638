//! Clipweave Sequence Model
//!
//! Defines the core data contracts for an export:
//! - **Clips:** Source media references with speed and blur effects
//! - **Sequence:** The ordered, validated clip list and its derived timeline
//! - **Settings:** Output resolution, frame rate, format, and quality
//! - **Geometry:** Letterbox fitting and percentage-based region placement
//!
//! Blur regions are expressed in percent of the fitted content box so they
//! scale with the output resolution.

pub mod clip;
pub mod geometry;
pub mod sequence;
pub mod settings;

pub use clip::*;
pub use geometry::*;
pub use sequence::*;
pub use settings::*;
