//! Export orchestration.
//!
//! [`ExportEngine::export`] validates the request, preloads every source,
//! then routes to the delegated transcode or the frame-capture path. A
//! failed webm transcode falls back once to frame capture with the live
//! recorder. Sources are released whatever the outcome.

use std::sync::Arc;

use clipweave_common::config::EngineConfig;
use clipweave_common::error::{ClipweaveError, ClipweaveResult};
use clipweave_sequence_model::sequence::Sequence;
use clipweave_sequence_model::settings::{ExportSettings, MediaType};
use serde::Serialize;

use crate::backend::capture::{CaptureOutcome, FrameCapture, FrameSink};
use crate::backend::gif_sink::GifSink;
use crate::backend::live::{FfmpegRecorder, LiveCaptureSink, Recorder};
use crate::backend::transcode::{BatchTranscoder, FfmpegTranscoder, TranscodeJob};
use crate::backend::{BackendKind, BackendRoute, CaptureSinkKind};
use crate::progress::{ProgressCallback, ProgressReporter, PRELOAD_BAND};
use crate::schedule::FrameScheduler;
use crate::seek::SeekController;
use crate::source::{FfmpegSourceLoader, MediaSource, SourceInfo, SourceLoader};
use crate::state::ExportStage;

/// Encoded export result.
#[derive(Debug, Clone, Serialize)]
pub struct ExportOutput {
    /// Encoded media.
    #[serde(skip)]
    pub bytes: Vec<u8>,

    pub media_type: MediaType,

    pub total_frames: u64,

    /// Backend that produced `bytes`.
    pub backend: BackendKind,

    /// Whether the webm fallback was taken.
    pub fell_back: bool,

    /// Frames that composited to background only.
    pub blank_frames: u64,

    /// Frames captured after a seek ran out of attempts.
    pub seek_shortfalls: u64,
}

/// Stateless export engine; one instance can serve many exports.
#[derive(Clone)]
pub struct ExportEngine {
    config: EngineConfig,
    loader: Arc<dyn SourceLoader>,
    transcoder: Arc<dyn BatchTranscoder>,
    recorder: Arc<dyn Recorder>,
}

impl ExportEngine {
    /// Engine using the ffmpeg command-line tools for every seam.
    pub fn new(config: EngineConfig) -> Self {
        let tools = config.ffmpeg.clone();
        Self {
            loader: Arc::new(FfmpegSourceLoader::new(tools.clone())),
            transcoder: Arc::new(FfmpegTranscoder::new(
                tools.clone(),
                config.timeouts.transcode(),
            )),
            recorder: Arc::new(FfmpegRecorder::new(tools)),
            config,
        }
    }

    pub fn with_source_loader(mut self, loader: Arc<dyn SourceLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_transcoder(mut self, transcoder: Arc<dyn BatchTranscoder>) -> Self {
        self.transcoder = transcoder;
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn Recorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Export `sequence` with `settings`.
    ///
    /// `progress` receives non-decreasing percentages ending at exactly 100
    /// on success; it is not called again once the export has failed.
    pub async fn export(
        &self,
        sequence: &Sequence,
        settings: &ExportSettings,
        progress: Option<ProgressCallback>,
    ) -> ClipweaveResult<ExportOutput> {
        let mut reporter = ProgressReporter::new(settings.format, progress);
        let started = std::time::Instant::now();

        let result = self.run(sequence, settings, &mut reporter).await;
        match &result {
            Ok(output) => tracing::info!(
                sequence = %sequence.name(),
                media_type = %output.media_type,
                backend = %output.backend,
                fell_back = output.fell_back,
                bytes = output.bytes.len(),
                elapsed_secs = started.elapsed().as_secs_f64(),
                "Export complete"
            ),
            Err(err) => {
                reporter.fail();
                tracing::error!(
                    sequence = %sequence.name(),
                    stage = %reporter.stage(),
                    error = %err,
                    "Export failed"
                );
            }
        }
        result
    }

    async fn run(
        &self,
        sequence: &Sequence,
        settings: &ExportSettings,
        reporter: &mut ProgressReporter,
    ) -> ClipweaveResult<ExportOutput> {
        reporter.enter(ExportStage::Initializing)?;
        settings
            .validate()
            .map_err(ClipweaveError::invalid_settings)?;
        let scheduler = FrameScheduler::new(sequence, settings.fps)?;
        reporter.set_total_frames(scheduler.total_frames());

        tracing::info!(
            sequence = %sequence.name(),
            clips = sequence.len(),
            total_duration = scheduler.total_duration(),
            total_frames = scheduler.total_frames(),
            width = settings.width,
            height = settings.height,
            fps = settings.fps,
            format = settings.format.extension(),
            quality = settings.quality,
            "Export started"
        );

        let mut sources: Vec<Box<dyn MediaSource>> = Vec::with_capacity(sequence.len());
        let result = self
            .run_with_sources(sequence, settings, &scheduler, &mut sources, reporter)
            .await;

        for source in &mut sources {
            source.release().await;
        }
        result
    }

    async fn run_with_sources(
        &self,
        sequence: &Sequence,
        settings: &ExportSettings,
        scheduler: &FrameScheduler,
        sources: &mut Vec<Box<dyn MediaSource>>,
        reporter: &mut ProgressReporter,
    ) -> ClipweaveResult<ExportOutput> {
        let infos = self.preload(sequence, sources, reporter).await?;

        let route = BackendRoute::for_format(settings.format);
        let seek = SeekController::new(self.config.seek.clone());
        let capture = FrameCapture {
            sequence,
            settings,
            scheduler,
            seek: &seek,
        };

        let (outcome, backend, fell_back) = match route {
            BackendRoute::FrameCapture(kind) => {
                let outcome = self.capture(&capture, kind, sources, reporter).await?;
                (outcome, BackendKind::FrameCapture, false)
            }
            BackendRoute::Batch { fallback } => {
                reporter.enter(ExportStage::Encoding)?;
                match self
                    .batch(sequence, settings, scheduler, sources, &infos, reporter)
                    .await
                {
                    Ok(bytes) => (
                        CaptureOutcome {
                            bytes,
                            media_type: settings.format.media_type(),
                            frames: scheduler.total_frames(),
                            blank_frames: 0,
                            seek_shortfalls: 0,
                        },
                        BackendKind::BatchTranscode,
                        false,
                    ),
                    Err(err) => {
                        let Some(kind) = fallback else {
                            return Err(err);
                        };
                        tracing::warn!(
                            error = %err,
                            transcoder = self.transcoder.name(),
                            "Delegated transcode failed; falling back to frame capture"
                        );
                        let outcome = self.capture(&capture, kind, sources, reporter).await?;
                        (outcome, BackendKind::FrameCapture, true)
                    }
                }
            }
        };

        reporter.complete()?;
        Ok(ExportOutput {
            bytes: outcome.bytes,
            media_type: outcome.media_type,
            total_frames: outcome.frames,
            backend,
            fell_back,
            blank_frames: outcome.blank_frames,
            seek_shortfalls: outcome.seek_shortfalls,
        })
    }

    /// Open and preload every clip's source, in order.
    async fn preload(
        &self,
        sequence: &Sequence,
        sources: &mut Vec<Box<dyn MediaSource>>,
        reporter: &mut ProgressReporter,
    ) -> ClipweaveResult<Vec<SourceInfo>> {
        let timeout = self.config.timeouts.preload();
        let count = sequence.len();
        let mut infos = Vec::with_capacity(count);

        for (i, clip) in sequence.clips().iter().enumerate() {
            sources.push(self.loader.open(clip)?);
            let source = sources
                .last_mut()
                .ok_or_else(|| ClipweaveError::render("source list is empty after open"))?;

            let info = match tokio::time::timeout(timeout, source.preload()).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(ClipweaveError::media_load(
                        &clip.id,
                        format!("source did not become decodable within {}s", timeout.as_secs()),
                    ))
                }
            };
            if info.width == 0 || info.height == 0 {
                tracing::warn!(clip_id = %clip.id, "Source reports zero dimensions");
            }
            infos.push(info);
            reporter.report_in(PRELOAD_BAND, (i + 1) as f64 / count as f64);
        }

        Ok(infos)
    }

    async fn batch(
        &self,
        sequence: &Sequence,
        settings: &ExportSettings,
        scheduler: &FrameScheduler,
        sources: &[Box<dyn MediaSource>],
        infos: &[SourceInfo],
        reporter: &mut ProgressReporter,
    ) -> ClipweaveResult<Vec<u8>> {
        let job = TranscodeJob::new(
            sequence.clips(),
            sources,
            infos,
            settings,
            scheduler.total_duration(),
            scheduler.total_frames(),
        )?;
        self.transcoder.transcode(&job, reporter).await
    }

    async fn capture(
        &self,
        capture: &FrameCapture<'_>,
        kind: CaptureSinkKind,
        sources: &mut [Box<dyn MediaSource>],
        reporter: &mut ProgressReporter,
    ) -> ClipweaveResult<CaptureOutcome> {
        let mut sink: Box<dyn FrameSink> = match kind {
            CaptureSinkKind::AnimatedImage => Box::new(GifSink::new(
                &self.config.gif,
                self.config.timeouts.gif_encode(),
            )),
            CaptureSinkKind::LiveRecorder => Box::new(LiveCaptureSink::new(
                self.recorder.clone(),
                &self.config.timeouts,
            )),
        };
        capture.run(sources, sink.as_mut(), reporter).await
    }
}

impl std::fmt::Debug for ExportEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportEngine")
            .field("config", &self.config)
            .field("transcoder", &self.transcoder.name())
            .field("recorder", &self.recorder.name())
            .finish()
    }
}

/// Export with default configuration and ffmpeg-backed seams.
pub async fn export_sequence(
    sequence: &Sequence,
    settings: &ExportSettings,
    progress: Option<ProgressCallback>,
) -> ClipweaveResult<ExportOutput> {
    ExportEngine::new(EngineConfig::default())
        .export(sequence, settings, progress)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipweave_sequence_model::clip::ClipDescriptor;
    use clipweave_sequence_model::settings::ExportFormat;

    #[tokio::test]
    async fn test_invalid_settings_fail_before_loading() {
        let sequence =
            Sequence::new("s", vec![ClipDescriptor::new("a", "/nonexistent/a.mp4", 1.0)]).unwrap();
        let settings = ExportSettings::new(641, 360, 30, ExportFormat::Mp4, 80);

        let err = ExportEngine::new(EngineConfig::default())
            .export(&sequence, &settings, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClipweaveError::InvalidSettings { .. }));
    }

    #[tokio::test]
    async fn test_missing_source_is_media_load_error() {
        let sequence =
            Sequence::new("s", vec![ClipDescriptor::new("a", "/nonexistent/a.mp4", 1.0)]).unwrap();
        let settings = ExportSettings::new(64, 36, 10, ExportFormat::Gif, 80);

        let err = export_sequence(&sequence, &settings, None).await.unwrap_err();
        assert!(matches!(err, ClipweaveError::MediaLoad { .. }));
    }
}
