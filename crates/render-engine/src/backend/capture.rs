//! Frame-capture backend: resolve, seek, composite and sink every frame.

use async_trait::async_trait;
use clipweave_common::error::ClipweaveResult;
use clipweave_sequence_model::sequence::Sequence;
use clipweave_sequence_model::settings::{ExportSettings, MediaType};
use image::RgbaImage;

use crate::compositor::Compositor;
use crate::progress::{ProgressReporter, FRAME_BAND};
use crate::schedule::{FrameScheduler, FrameSlot};
use crate::seek::SeekController;
use crate::source::MediaSource;
use crate::state::ExportStage;

/// Consumer of composited frames.
#[async_trait]
pub trait FrameSink: Send {
    fn name(&self) -> &str;

    /// Media type of the bytes returned by [`FrameSink::finish`].
    fn media_type(&self) -> MediaType;

    /// Called once before the first frame.
    async fn begin(&mut self, settings: &ExportSettings, total_frames: u64) -> ClipweaveResult<()>;

    /// Take one frame. `frame` is reused by the caller after this returns.
    async fn accept(&mut self, frame: &RgbaImage, slot: &FrameSlot) -> ClipweaveResult<()>;

    /// Encode everything accepted so far. Reports into the encode band.
    async fn finish(&mut self, progress: &mut ProgressReporter) -> ClipweaveResult<Vec<u8>>;

    /// Discard work after a failure.
    async fn abort(&mut self);
}

/// Result of a completed capture.
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub bytes: Vec<u8>,
    /// Media type reported by the sink that produced `bytes`.
    pub media_type: MediaType,
    pub frames: u64,
    pub blank_frames: u64,
    pub seek_shortfalls: u64,
}

/// Everything the capture loop borrows for one run.
pub struct FrameCapture<'a> {
    pub sequence: &'a Sequence,
    pub settings: &'a ExportSettings,
    pub scheduler: &'a FrameScheduler,
    pub seek: &'a SeekController,
}

impl FrameCapture<'_> {
    /// Render every frame into `sink` and encode the result.
    ///
    /// Frames are produced strictly in order: each seek completes before
    /// the next frame is resolved.
    pub async fn run(
        &self,
        sources: &mut [Box<dyn MediaSource>],
        sink: &mut dyn FrameSink,
        progress: &mut ProgressReporter,
    ) -> ClipweaveResult<CaptureOutcome> {
        progress.enter(ExportStage::Rendering)?;

        match self.render_and_encode(sources, sink, progress).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                sink.abort().await;
                Err(err)
            }
        }
    }

    async fn render_and_encode(
        &self,
        sources: &mut [Box<dyn MediaSource>],
        sink: &mut dyn FrameSink,
        progress: &mut ProgressReporter,
    ) -> ClipweaveResult<CaptureOutcome> {
        let total_frames = self.scheduler.total_frames();
        let clips = self.sequence.clips();

        sink.begin(self.settings, total_frames).await?;
        tracing::info!(
            sink = sink.name(),
            total_frames,
            width = self.settings.width,
            height = self.settings.height,
            fps = self.settings.fps,
            "Frame capture started"
        );

        let mut compositor = Compositor::new(self.settings.width, self.settings.height);
        let mut surface = compositor.new_surface();
        let mut blank_frames = 0u64;
        let mut seek_shortfalls = 0u64;

        for slot in self.scheduler.slots() {
            let source = &mut sources[slot.clip_index];
            let outcome = self.seek.seek(source.as_mut(), slot.local_time).await;
            if !outcome.is_ready() {
                seek_shortfalls += 1;
            }

            let report = compositor.composite(
                &mut surface,
                source.current_frame(),
                &clips[slot.clip_index].effects,
            );
            if report.blank {
                blank_frames += 1;
                tracing::warn!(
                    frame = slot.index,
                    clip_id = %clips[slot.clip_index].id,
                    local_time = slot.local_time,
                    degenerate = report.degenerate,
                    "Composited frame contains only background"
                );
            }

            sink.accept(&surface, &slot).await?;

            let done = slot.index + 1;
            progress.set_frames_rendered(done);
            progress.report_in(FRAME_BAND, done as f64 / total_frames.max(1) as f64);
        }

        progress.enter(ExportStage::Encoding)?;
        let bytes = sink.finish(progress).await?;

        tracing::info!(
            sink = sink.name(),
            frames = total_frames,
            blank_frames,
            seek_shortfalls,
            bytes = bytes.len(),
            "Frame capture finished"
        );

        Ok(CaptureOutcome {
            bytes,
            media_type: sink.media_type(),
            frames: total_frames,
            blank_frames,
            seek_shortfalls,
        })
    }
}
