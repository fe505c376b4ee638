//! Live-capture sink: real-time paced presentation into a recorder.
//!
//! Used only when the delegated webm transcode fails. Each composited frame
//! is copied onto a presentation surface at its absolute deadline on a
//! [`PresentationClock`], and the recorder captures whatever is presented.
//! Codec and bitrate come from probing what the recorder supports.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use clipweave_common::clock::PresentationClock;
use clipweave_common::config::{FfmpegConfig, TimeoutConfig};
use clipweave_common::error::{ClipweaveError, ClipweaveResult};
use clipweave_sequence_model::settings::{ExportSettings, MediaType};
use image::RgbaImage;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin};
use tokio::task::JoinHandle;

use super::capture::FrameSink;
use super::transcode::target_bitrate_kbps;
use crate::ffmpeg;
use crate::progress::{ProgressReporter, ENCODE_BAND};
use crate::schedule::FrameSlot;

/// Codecs the live recorder may use, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiveCodec {
    Vp9,
    Vp8,
}

impl LiveCodec {
    pub const PREFERENCE: [LiveCodec; 2] = [LiveCodec::Vp9, LiveCodec::Vp8];

    pub fn encoder(self) -> &'static str {
        match self {
            LiveCodec::Vp9 => "libvpx-vp9",
            LiveCodec::Vp8 => "libvpx",
        }
    }
}

/// Chosen recording configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderProfile {
    pub codec: LiveCodec,
    pub bitrate_kbps: u32,
}

/// Pick the most preferred codec among `available` encoders.
pub fn select_profile(available: &[String], settings: &ExportSettings) -> Option<RecorderProfile> {
    LiveCodec::PREFERENCE
        .into_iter()
        .find(|codec| available.iter().any(|name| name == codec.encoder()))
        .map(|codec| RecorderProfile {
            codec,
            bitrate_kbps: target_bitrate_kbps(settings.width, settings.height, settings.quality),
        })
}

/// A recorder that captures presented frames into webm.
#[async_trait]
pub trait Recorder: Send + Sync {
    fn name(&self) -> &str;

    /// Find a supported codec, degrading from VP9 to VP8.
    async fn probe(&self, settings: &ExportSettings) -> ClipweaveResult<RecorderProfile>;

    /// Start capturing.
    async fn start(
        &self,
        profile: &RecorderProfile,
        settings: &ExportSettings,
    ) -> ClipweaveResult<Box<dyn RecordingSession>>;
}

/// An active capture.
#[async_trait]
pub trait RecordingSession: Send {
    /// Capture the currently presented surface.
    async fn push(&mut self, surface: &RgbaImage) -> ClipweaveResult<()>;

    /// Stop capturing and return the recorded bytes.
    async fn stop(self: Box<Self>) -> ClipweaveResult<Vec<u8>>;
}

/// [`Recorder`] that streams raw frames into an ffmpeg child process.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRecorder {
    tools: FfmpegConfig,
}

impl FfmpegRecorder {
    pub fn new(tools: FfmpegConfig) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl Recorder for FfmpegRecorder {
    fn name(&self) -> &str {
        "ffmpeg-live"
    }

    async fn probe(&self, settings: &ExportSettings) -> ClipweaveResult<RecorderProfile> {
        let encoders = ffmpeg::list_encoders(&self.tools.ffmpeg_bin)
            .await
            .map_err(|e| ClipweaveError::encode(format!("Recorder probe failed: {e:#}")))?;
        select_profile(&encoders, settings).ok_or_else(|| {
            ClipweaveError::unsupported("no webm-capable encoder (libvpx-vp9 or libvpx) available")
        })
    }

    async fn start(
        &self,
        profile: &RecorderProfile,
        settings: &ExportSettings,
    ) -> ClipweaveResult<Box<dyn RecordingSession>> {
        let scratch = tempfile::Builder::new()
            .prefix("clipweave-live-")
            .tempdir()
            .map_err(|e| ClipweaveError::encode(format!("Failed to create recorder scratch dir: {e}")))?;
        let output = scratch.path().join("capture.webm");

        let mut child = tokio::process::Command::new(&self.tools.ffmpeg_bin)
            .args([
                "-y",
                "-hide_banner",
                "-loglevel",
                "error",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgba",
                "-s",
                &format!("{}x{}", settings.width, settings.height),
                "-r",
                &settings.fps.to_string(),
                "-i",
                "pipe:0",
                "-an",
                "-c:v",
                profile.codec.encoder(),
                "-b:v",
                &format!("{}k", profile.bitrate_kbps),
                "-pix_fmt",
                "yuv420p",
            ])
            .arg(&output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ClipweaveError::encode(format!("Failed to start recorder: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ClipweaveError::encode("Failed to open recorder stdin"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ClipweaveError::encode("Failed to capture recorder stderr"))?;
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            let _ = stderr.read_to_string(&mut output).await;
            output
        });

        tracing::info!(
            pid = child.id(),
            codec = profile.codec.encoder(),
            bitrate_kbps = profile.bitrate_kbps,
            "Live recorder started"
        );

        Ok(Box::new(FfmpegRecordingSession {
            child,
            stdin: Some(stdin),
            stderr_task,
            output,
            scratch,
        }))
    }
}

struct FfmpegRecordingSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_task: JoinHandle<String>,
    output: PathBuf,
    scratch: tempfile::TempDir,
}

#[async_trait]
impl RecordingSession for FfmpegRecordingSession {
    async fn push(&mut self, surface: &RgbaImage) -> ClipweaveResult<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ClipweaveError::encode("recorder is already stopped"));
        };
        stdin
            .write_all(surface.as_raw())
            .await
            .map_err(|e| ClipweaveError::encode(format!("Failed to write frame to recorder: {e}")))
    }

    async fn stop(self: Box<Self>) -> ClipweaveResult<Vec<u8>> {
        let mut this = self;
        drop(this.stdin.take());

        let status = this
            .child
            .wait()
            .await
            .map_err(|e| ClipweaveError::encode(format!("Failed waiting on recorder: {e}")))?;
        let stderr = (&mut this.stderr_task).await.unwrap_or_default();

        let result = if status.success() {
            tokio::fs::read(&this.output)
                .await
                .map_err(|e| ClipweaveError::encode(format!("Failed to read recording: {e}")))
        } else {
            Err(ClipweaveError::encode(format!(
                "recorder exited with {status}: {}",
                stderr.trim()
            )))
        };

        let FfmpegRecordingSession { scratch, .. } = *this;
        if let Err(e) = scratch.close() {
            tracing::warn!(error = %e, "Failed to remove recorder scratch directory");
        }
        result
    }
}

/// Drift beyond this many frame intervals is logged.
const DRIFT_WARN_INTERVALS: f64 = 2.0;

/// [`FrameSink`] presenting frames in real time to a [`Recorder`].
pub struct LiveCaptureSink {
    recorder: Arc<dyn Recorder>,
    settle: Duration,
    finalize_timeout: Duration,
    presentation: RgbaImage,
    session: Option<Box<dyn RecordingSession>>,
    clock: Option<PresentationClock>,
    presented: u64,
    total_frames: u64,
    max_drift_ms: f64,
}

impl LiveCaptureSink {
    pub fn new(recorder: Arc<dyn Recorder>, timeouts: &TimeoutConfig) -> Self {
        Self {
            recorder,
            settle: timeouts.recorder_settle(),
            finalize_timeout: timeouts.recorder_finalize(),
            presentation: RgbaImage::new(0, 0),
            session: None,
            clock: None,
            presented: 0,
            total_frames: 0,
            max_drift_ms: 0.0,
        }
    }
}

#[async_trait]
impl FrameSink for LiveCaptureSink {
    fn name(&self) -> &str {
        "live-capture"
    }

    fn media_type(&self) -> MediaType {
        MediaType::VideoWebm
    }

    async fn begin(&mut self, settings: &ExportSettings, total_frames: u64) -> ClipweaveResult<()> {
        let profile = self.recorder.probe(settings).await?;
        tracing::info!(
            recorder = self.recorder.name(),
            codec = ?profile.codec,
            bitrate_kbps = profile.bitrate_kbps,
            "Live capture profile selected"
        );

        self.presentation = RgbaImage::new(settings.width, settings.height);
        self.session = Some(self.recorder.start(&profile, settings).await?);
        self.clock = Some(PresentationClock::start(settings.fps));
        self.presented = 0;
        self.total_frames = total_frames;
        self.max_drift_ms = 0.0;
        Ok(())
    }

    async fn accept(&mut self, frame: &RgbaImage, slot: &FrameSlot) -> ClipweaveResult<()> {
        let (Some(clock), Some(session)) = (self.clock.as_ref(), self.session.as_mut()) else {
            return Err(ClipweaveError::encode("live capture was not started"));
        };

        let deadline = clock.deadline(self.presented);
        tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;

        self.presentation.clone_from(frame);
        let drift = clock.drift(self.presented, Instant::now());
        self.max_drift_ms = self.max_drift_ms.max(drift.drift_ms());
        let interval_ms = clock.interval().as_secs_f64() * 1000.0;
        if drift.exceeds_threshold_ms(interval_ms * DRIFT_WARN_INTERVALS) {
            tracing::debug!(
                frame = slot.index,
                drift_ms = drift.drift_ms(),
                "Presentation is behind schedule"
            );
        }

        session.push(&self.presentation).await?;
        self.presented += 1;
        Ok(())
    }

    async fn finish(&mut self, progress: &mut ProgressReporter) -> ClipweaveResult<Vec<u8>> {
        let session = self
            .session
            .take()
            .ok_or_else(|| ClipweaveError::encode("live capture was not started"))?;

        tokio::time::sleep(self.settle).await;
        progress.report_in(ENCODE_BAND, 0.5);

        let bytes = match tokio::time::timeout(self.finalize_timeout, session.stop()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ClipweaveError::encode(format!(
                    "recorder did not finalize within {}s",
                    self.finalize_timeout.as_secs()
                )))
            }
        };

        if let Some(clock) = &self.clock {
            tracing::info!(
                frames = self.presented,
                expected_frames = self.total_frames,
                started_at = %clock.epoch_wall(),
                elapsed_secs = clock.elapsed().as_secs_f64(),
                nominal_secs = clock.nominal(self.presented).as_secs_f64(),
                max_drift_ms = self.max_drift_ms,
                bytes = bytes.len(),
                "Live capture finished"
            );
        }
        progress.report_in(ENCODE_BAND, 1.0);
        Ok(bytes)
    }

    async fn abort(&mut self) {
        // Dropping the session kills the recorder process.
        self.session = None;
        self.clock = None;
    }
}
