//! Progress reporting for a single export.
//!
//! All phases report through one [`ProgressReporter`], which keeps values
//! non-decreasing, ends successful exports at exactly 100 and goes silent
//! once the export is finalized either way.

use clipweave_common::error::ClipweaveResult;
use clipweave_sequence_model::settings::ExportFormat;
use serde::Serialize;

use crate::state::{ExportStage, ExportStateMachine};

/// Progress callback type.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send>;

/// Progress report for an ongoing export.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExportProgress {
    /// Percent complete in `[0, 100]`.
    pub percent: f64,

    /// Stage the export is in.
    pub stage: ExportStage,

    /// Frames produced so far (frame-capture path) or estimated from the
    /// delegated pipeline's output time.
    pub frames_rendered: u64,

    /// Total output frames.
    pub total_frames: u64,
}

/// A slice of the 0-100 range owned by one phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressBand {
    pub start: f64,
    pub end: f64,
}

impl ProgressBand {
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Map a phase-local fraction onto the band.
    pub fn at(&self, fraction: f64) -> f64 {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.start + (self.end - self.start) * fraction
    }
}

/// Source preloading.
pub const PRELOAD_BAND: ProgressBand = ProgressBand::new(0.0, 30.0);
/// Frame generation on the capture path.
pub const FRAME_BAND: ProgressBand = ProgressBand::new(30.0, 80.0);
/// Encoding on the capture path.
pub const ENCODE_BAND: ProgressBand = ProgressBand::new(80.0, 100.0);
/// Delegated whole-sequence transcode.
pub const TRANSCODE_BAND: ProgressBand = ProgressBand::new(30.0, 100.0);

/// Stateful progress sink threaded through every export phase.
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    machine: ExportStateMachine,
    last_percent: f64,
    frames_rendered: u64,
    total_frames: u64,
    finalized: bool,
}

impl ProgressReporter {
    pub fn new(format: ExportFormat, callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            machine: ExportStateMachine::new(format),
            last_percent: 0.0,
            frames_rendered: 0,
            total_frames: 0,
            finalized: false,
        }
    }

    pub fn stage(&self) -> ExportStage {
        self.machine.stage()
    }

    pub fn fell_back(&self) -> bool {
        self.machine.fell_back()
    }

    /// Highest percent reported so far.
    pub fn last_percent(&self) -> f64 {
        self.last_percent
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Move to `stage` if the lifecycle allows it.
    pub fn enter(&mut self, stage: ExportStage) -> ClipweaveResult<()> {
        self.machine.transition(stage)
    }

    pub fn set_total_frames(&mut self, total_frames: u64) {
        self.total_frames = total_frames;
    }

    pub fn set_frames_rendered(&mut self, frames_rendered: u64) {
        self.frames_rendered = frames_rendered;
    }

    /// Report `percent`; values below the previous report are raised to it.
    pub fn report(&mut self, percent: f64) {
        if self.finalized {
            return;
        }
        let percent = if percent.is_finite() {
            percent.clamp(0.0, 100.0)
        } else {
            self.last_percent
        };
        self.last_percent = self.last_percent.max(percent);
        self.emit();
    }

    /// Report progress as a fraction of `band`.
    pub fn report_in(&mut self, band: ProgressBand, fraction: f64) {
        self.report(band.at(fraction));
    }

    /// Finish successfully: emits exactly 100 once.
    pub fn complete(&mut self) -> ClipweaveResult<()> {
        if self.finalized {
            return Ok(());
        }
        self.machine.transition(ExportStage::Complete)?;
        self.last_percent = 100.0;
        self.frames_rendered = self.total_frames;
        self.emit();
        self.finalized = true;
        Ok(())
    }

    /// Finish with an error. No further reports are emitted.
    pub fn fail(&mut self) {
        if self.finalized {
            return;
        }
        if let Err(err) = self.machine.transition(ExportStage::Failed) {
            tracing::debug!(error = %err, "Failed stage not reachable");
        }
        self.finalized = true;
    }

    fn emit(&self) {
        if let Some(cb) = &self.callback {
            cb(ExportProgress {
                percent: self.last_percent,
                stage: self.machine.stage(),
                frames_rendered: self.frames_rendered,
                total_frames: self.total_frames,
            });
        }
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("stage", &self.machine.stage())
            .field("last_percent", &self.last_percent)
            .field("finalized", &self.finalized)
            .finish()
    }
}
