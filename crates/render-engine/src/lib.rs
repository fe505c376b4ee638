//! Clipweave Render Engine
//!
//! Turns an ordered sequence of clips into a single encoded GIF, MP4 or
//! WebM, reporting progress along the way.
//!
//! # Pipeline Architecture
//!
//! ```text
//!                       ┌── mp4/webm ── Batch transcode (one ffmpeg run)
//! Sequence + Settings ──┤                     │ webm failure
//!        │              │                     ▼
//!   Preload sources     └── gif ──────── Frame capture
//!                                              │
//!                          FrameScheduler ── resolve frame i -> (clip, local time)
//!                                              │
//!                          SeekController ── bounded-retry seek
//!                                              │
//!                          Compositor ─────── letterbox + blur
//!                                              │
//!                          FrameSink ──────── GIF workers | live recorder
//!                                              │
//!                                              ▼
//!                                       bytes + media type
//! ```

pub mod backend;
pub mod blur;
pub mod compositor;
pub mod export;
pub mod ffmpeg;
pub mod progress;
pub mod schedule;
pub mod seek;
pub mod source;
pub mod state;

pub use export::*;
pub use progress::{ExportProgress, ProgressCallback};
pub use state::ExportStage;
