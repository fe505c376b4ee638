//! Export backends.
//!
//! Two paths turn a sequence into bytes:
//! - **Batch transcode**: one delegated ffmpeg run over the clip files
//!   (mp4, webm).
//! - **Frame capture**: the engine renders every frame itself and hands it
//!   to a [`capture::FrameSink`] (gif always, webm as fallback).

pub mod capture;
pub mod gif_sink;
pub mod live;
pub mod transcode;

use clipweave_sequence_model::settings::ExportFormat;
use serde::Serialize;

/// Which backend produced an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    BatchTranscode,
    FrameCapture,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::BatchTranscode => "batch-transcode",
            BackendKind::FrameCapture => "frame-capture",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination of captured frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureSinkKind {
    /// Multi-worker animated GIF encoder.
    AnimatedImage,
    /// Real-time paced presentation into a live recorder.
    LiveRecorder,
}

/// Backend selection for a format, including its single fallback edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendRoute {
    Batch { fallback: Option<CaptureSinkKind> },
    FrameCapture(CaptureSinkKind),
}

impl BackendRoute {
    pub fn for_format(format: ExportFormat) -> Self {
        match format {
            ExportFormat::Gif => BackendRoute::FrameCapture(CaptureSinkKind::AnimatedImage),
            ExportFormat::Mp4 => BackendRoute::Batch { fallback: None },
            ExportFormat::Webm => BackendRoute::Batch {
                fallback: Some(CaptureSinkKind::LiveRecorder),
            },
        }
    }

    /// Backend tried first.
    pub fn primary(&self) -> BackendKind {
        match self {
            BackendRoute::Batch { .. } => BackendKind::BatchTranscode,
            BackendRoute::FrameCapture(_) => BackendKind::FrameCapture,
        }
    }
}
