//! In-memory test doubles for the engine's seams.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clipweave_common::error::{ClipweaveError, ClipweaveResult};
use clipweave_render_engine::backend::live::{
    LiveCodec, Recorder, RecorderProfile, RecordingSession,
};
use clipweave_render_engine::backend::transcode::{BatchTranscoder, TranscodeJob};
use clipweave_render_engine::progress::{ProgressReporter, TRANSCODE_BAND};
use clipweave_render_engine::source::{MediaSource, Readiness, SourceInfo, SourceLoader};
use clipweave_render_engine::{ExportProgress, ProgressCallback};
use clipweave_sequence_model::clip::ClipDescriptor;
use clipweave_sequence_model::settings::ExportSettings;
use image::{Rgba, RgbaImage};

/// WebM files start with the EBML magic.
pub const WEBM_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

/// How synthetic sources behave.
#[derive(Debug, Clone)]
pub struct SourceBehavior {
    pub width: u32,
    pub height: u32,
    pub file_backed: bool,
    pub fail_preload: bool,
    pub black_frames: bool,
    /// Added to every landed position.
    pub landing_error: f64,
}

impl Default for SourceBehavior {
    fn default() -> Self {
        Self {
            width: 64,
            height: 36,
            file_backed: true,
            fail_preload: false,
            black_frames: false,
            landing_error: 0.0,
        }
    }
}

/// Loader producing [`SyntheticSource`]s and counting lifecycle calls.
#[derive(Debug, Default)]
pub struct SyntheticLoader {
    pub behavior: SourceBehavior,
    pub opened: AtomicUsize,
    pub released: Arc<AtomicUsize>,
    pub seeks: Arc<AtomicUsize>,
}

impl SyntheticLoader {
    pub fn new(behavior: SourceBehavior) -> Self {
        Self {
            behavior,
            ..Self::default()
        }
    }
}

impl SourceLoader for SyntheticLoader {
    fn open(&self, clip: &ClipDescriptor) -> ClipweaveResult<Box<dyn MediaSource>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticSource {
            clip_id: clip.id.clone(),
            path: clip.source.clone(),
            duration_secs: clip.duration_secs,
            behavior: self.behavior.clone(),
            frame: None,
            landed: None,
            released: self.released.clone(),
            seeks: self.seeks.clone(),
        }))
    }
}

/// Source whose frame color encodes the requested position.
pub struct SyntheticSource {
    clip_id: String,
    path: PathBuf,
    duration_secs: f64,
    behavior: SourceBehavior,
    frame: Option<RgbaImage>,
    landed: Option<f64>,
    released: Arc<AtomicUsize>,
    seeks: Arc<AtomicUsize>,
}

#[async_trait]
impl MediaSource for SyntheticSource {
    fn clip_id(&self) -> &str {
        &self.clip_id
    }

    fn location(&self) -> Option<&Path> {
        self.behavior.file_backed.then_some(self.path.as_path())
    }

    async fn preload(&mut self) -> ClipweaveResult<SourceInfo> {
        if self.behavior.fail_preload {
            return Err(ClipweaveError::media_load(&self.clip_id, "synthetic preload failure"));
        }
        Ok(SourceInfo {
            width: self.behavior.width,
            height: self.behavior.height,
            duration_secs: self.duration_secs,
        })
    }

    fn seek(&mut self, position_secs: f64) {
        self.seeks.fetch_add(1, Ordering::SeqCst);
        let color = if self.behavior.black_frames {
            Rgba([0, 0, 0, 255])
        } else {
            let shade = 40 + ((position_secs / self.duration_secs) * 200.0) as u8;
            Rgba([shade, shade / 2, 255 - shade, 255])
        };
        self.frame = Some(RgbaImage::from_pixel(
            self.behavior.width,
            self.behavior.height,
            color,
        ));
        self.landed = Some(position_secs + self.behavior.landing_error);
    }

    async fn readiness(&mut self) -> Readiness {
        match self.landed {
            Some(position_secs) => Readiness::Ready { position_secs },
            None => Readiness::Pending,
        }
    }

    fn current_frame(&self) -> Option<&RgbaImage> {
        self.frame.as_ref()
    }

    async fn release(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
        self.frame = None;
    }
}

/// What a scripted transcoder does when called.
#[derive(Debug, Clone)]
pub enum TranscodeScript {
    Succeed(Vec<u8>),
    Fail(String),
}

/// Transcoder double recording the jobs it receives.
#[derive(Debug)]
pub struct ScriptedTranscoder {
    pub script: TranscodeScript,
    pub calls: AtomicUsize,
    pub inputs_seen: Mutex<Vec<usize>>,
}

impl ScriptedTranscoder {
    pub fn new(script: TranscodeScript) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            inputs_seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl BatchTranscoder for ScriptedTranscoder {
    fn name(&self) -> &str {
        "scripted"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn transcode(
        &self,
        job: &TranscodeJob<'_>,
        progress: &mut ProgressReporter,
    ) -> ClipweaveResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs_seen.lock().unwrap().push(job.inputs.len());
        progress.report_in(TRANSCODE_BAND, 0.5);
        match &self.script {
            TranscodeScript::Succeed(bytes) => {
                progress.report_in(TRANSCODE_BAND, 1.0);
                Ok(bytes.clone())
            }
            TranscodeScript::Fail(message) => Err(ClipweaveError::transcode(message.clone())),
        }
    }
}

/// Recorder double that stores pushed frames in memory.
#[derive(Debug)]
pub struct MemoryRecorder {
    pub available: Vec<LiveCodec>,
    pub started: AtomicUsize,
    pub frames: Arc<AtomicUsize>,
}

impl MemoryRecorder {
    pub fn new(available: Vec<LiveCodec>) -> Self {
        Self {
            available,
            started: AtomicUsize::new(0),
            frames: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Recorder for MemoryRecorder {
    fn name(&self) -> &str {
        "memory"
    }

    async fn probe(&self, settings: &ExportSettings) -> ClipweaveResult<RecorderProfile> {
        let names: Vec<String> = self
            .available
            .iter()
            .map(|codec| codec.encoder().to_string())
            .collect();
        clipweave_render_engine::backend::live::select_profile(&names, settings)
            .ok_or_else(|| ClipweaveError::unsupported("no codec"))
    }

    async fn start(
        &self,
        _profile: &RecorderProfile,
        _settings: &ExportSettings,
    ) -> ClipweaveResult<Box<dyn RecordingSession>> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            frames: self.frames.clone(),
        }))
    }
}

struct MemorySession {
    frames: Arc<AtomicUsize>,
}

#[async_trait]
impl RecordingSession for MemorySession {
    async fn push(&mut self, _surface: &RgbaImage) -> ClipweaveResult<()> {
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(self: Box<Self>) -> ClipweaveResult<Vec<u8>> {
        let mut bytes = WEBM_MAGIC.to_vec();
        bytes.extend_from_slice(b"synthetic");
        Ok(bytes)
    }
}

/// Progress callback that records every report.
pub fn recording_progress() -> (ProgressCallback, Arc<Mutex<Vec<ExportProgress>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback: ProgressCallback = Box::new(move |p| sink.lock().unwrap().push(p));
    (callback, seen)
}

/// Assert reports never decrease.
pub fn assert_monotonic(reports: &[ExportProgress]) {
    for pair in reports.windows(2) {
        assert!(
            pair[1].percent >= pair[0].percent,
            "progress went backwards: {} -> {}",
            pair[0].percent,
            pair[1].percent
        );
    }
}
