//! Decodable media sources.
//!
//! A [`MediaSource`] is an opaque handle to one clip's media that can be
//! preloaded, positioned at a source time and asked for the decoded frame
//! at that position. Seeking is asynchronous: [`MediaSource::seek`] only
//! requests a position, and [`MediaSource::readiness`] reports when a frame
//! for it has been decoded.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use clipweave_common::config::FfmpegConfig;
use clipweave_common::error::{ClipweaveError, ClipweaveResult};
use clipweave_sequence_model::clip::ClipDescriptor;
use image::RgbaImage;
use tokio::task::JoinHandle;

use crate::ffmpeg;

/// Facts about a preloaded source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
}

/// Decode state of the most recent seek request.
#[derive(Debug, Clone, PartialEq)]
pub enum Readiness {
    /// No decodable frame yet.
    Pending,
    /// A frame is decoded; `position_secs` is where the source actually landed.
    Ready { position_secs: f64 },
    /// The last request failed to decode.
    Failed { message: String },
}

/// A clip's media, positioned and decoded on demand.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Identifier of the clip this source belongs to.
    fn clip_id(&self) -> &str;

    /// File backing this source, when there is one.
    ///
    /// The delegated transcode pipeline can only consume file-backed sources.
    fn location(&self) -> Option<&Path>;

    /// Make the source decodable. Must be called before any seek.
    async fn preload(&mut self) -> ClipweaveResult<SourceInfo>;

    /// Request the source be positioned at `position_secs`.
    ///
    /// Replaces any outstanding request.
    fn seek(&mut self, position_secs: f64);

    /// Current decode state for the last requested position.
    async fn readiness(&mut self) -> Readiness;

    /// The most recently decoded frame, if any.
    fn current_frame(&self) -> Option<&RgbaImage>;

    /// Drop decoder resources. Safe to call more than once.
    async fn release(&mut self);
}

/// Opens a [`MediaSource`] for each clip of a sequence.
pub trait SourceLoader: Send + Sync {
    fn open(&self, clip: &ClipDescriptor) -> ClipweaveResult<Box<dyn MediaSource>>;
}

/// Loader that decodes clip files with the ffmpeg command-line tools.
#[derive(Debug, Clone, Default)]
pub struct FfmpegSourceLoader {
    tools: FfmpegConfig,
}

impl FfmpegSourceLoader {
    pub fn new(tools: FfmpegConfig) -> Self {
        Self { tools }
    }
}

impl SourceLoader for FfmpegSourceLoader {
    fn open(&self, clip: &ClipDescriptor) -> ClipweaveResult<Box<dyn MediaSource>> {
        Ok(Box::new(FfmpegSource::new(
            clip.id.clone(),
            clip.source.clone(),
            clip.duration_secs,
            self.tools.clone(),
        )))
    }
}

/// File-backed source that decodes single frames via ffmpeg.
pub struct FfmpegSource {
    clip_id: String,
    path: PathBuf,
    declared_duration: f64,
    tools: FfmpegConfig,
    info: Option<SourceInfo>,
    frame: Option<RgbaImage>,
    position: Option<f64>,
    pending: Option<PendingDecode>,
}

struct PendingDecode {
    target_secs: f64,
    task: JoinHandle<anyhow::Result<RgbaImage>>,
}

impl FfmpegSource {
    pub fn new(
        clip_id: impl Into<String>,
        path: impl Into<PathBuf>,
        declared_duration: f64,
        tools: FfmpegConfig,
    ) -> Self {
        Self {
            clip_id: clip_id.into(),
            path: path.into(),
            declared_duration,
            tools,
            info: None,
            frame: None,
            position: None,
            pending: None,
        }
    }

    fn abort_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.task.abort();
        }
    }
}

#[async_trait]
impl MediaSource for FfmpegSource {
    fn clip_id(&self) -> &str {
        &self.clip_id
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }

    async fn preload(&mut self) -> ClipweaveResult<SourceInfo> {
        if let Some(info) = self.info {
            return Ok(info);
        }
        if !self.path.is_file() {
            return Err(ClipweaveError::media_load(
                &self.clip_id,
                format!("source file not found: {}", self.path.display()),
            ));
        }

        let probed = ffmpeg::probe_media(&self.tools.ffprobe_bin, &self.path)
            .await
            .map_err(|e| ClipweaveError::media_load(&self.clip_id, format!("{e:#}")))?;

        let info = SourceInfo {
            width: probed.width,
            height: probed.height,
            duration_secs: probed.duration_secs.unwrap_or(self.declared_duration),
        };

        if (info.duration_secs - self.declared_duration).abs() > 0.5 {
            tracing::warn!(
                clip_id = %self.clip_id,
                declared_secs = self.declared_duration,
                probed_secs = info.duration_secs,
                "Declared clip duration differs from probed media duration"
            );
        }

        tracing::debug!(
            clip_id = %self.clip_id,
            width = info.width,
            height = info.height,
            duration_secs = info.duration_secs,
            "Source preloaded"
        );
        self.info = Some(info);
        Ok(info)
    }

    fn seek(&mut self, position_secs: f64) {
        self.abort_pending();
        let Some(info) = self.info else {
            tracing::warn!(clip_id = %self.clip_id, "Seek requested before preload");
            return;
        };

        let ffmpeg_bin = self.tools.ffmpeg_bin.clone();
        let path = self.path.clone();
        let task = tokio::spawn(async move {
            ffmpeg::decode_frame(&ffmpeg_bin, &path, position_secs, info.width, info.height).await
        });
        self.pending = Some(PendingDecode {
            target_secs: position_secs,
            task,
        });
    }

    async fn readiness(&mut self) -> Readiness {
        match &self.pending {
            Some(pending) if !pending.task.is_finished() => return Readiness::Pending,
            Some(_) => {}
            None => {
                return match self.position {
                    Some(position_secs) => Readiness::Ready { position_secs },
                    None => Readiness::Pending,
                }
            }
        }

        let Some(pending) = self.pending.take() else {
            return Readiness::Pending;
        };
        match pending.task.await {
            Ok(Ok(frame)) => {
                self.frame = Some(frame);
                self.position = Some(pending.target_secs);
                Readiness::Ready {
                    position_secs: pending.target_secs,
                }
            }
            Ok(Err(e)) => Readiness::Failed {
                message: format!("{e:#}"),
            },
            Err(e) => Readiness::Failed {
                message: format!("decode task failed: {e}"),
            },
        }
    }

    fn current_frame(&self) -> Option<&RgbaImage> {
        self.frame.as_ref()
    }

    async fn release(&mut self) {
        self.abort_pending();
        self.frame = None;
        self.position = None;
        self.info = None;
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.abort_pending();
    }
}
