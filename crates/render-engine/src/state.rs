//! Export lifecycle state machine.

use clipweave_common::error::{ClipweaveError, ClipweaveResult};
use clipweave_sequence_model::settings::ExportFormat;
use serde::{Deserialize, Serialize};

/// Current stage of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStage {
    Idle,
    /// Validating input and preloading sources.
    Initializing,
    /// Producing composited frames.
    Rendering,
    /// Encoding frames (or running the delegated pipeline).
    Encoding,
    Complete,
    Failed,
}

impl ExportStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExportStage::Complete | ExportStage::Failed)
    }

    pub fn label(self) -> &'static str {
        match self {
            ExportStage::Idle => "idle",
            ExportStage::Initializing => "initializing",
            ExportStage::Rendering => "rendering",
            ExportStage::Encoding => "encoding",
            ExportStage::Complete => "complete",
            ExportStage::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ExportStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Tracks and validates stage transitions for one export.
///
/// The only backwards edge is `Encoding -> Rendering`, taken once when a
/// webm batch transcode fails and the frame-capture path takes over.
#[derive(Debug, Clone)]
pub struct ExportStateMachine {
    format: ExportFormat,
    stage: ExportStage,
    fell_back: bool,
}

impl ExportStateMachine {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            stage: ExportStage::Idle,
            fell_back: false,
        }
    }

    pub fn stage(&self) -> ExportStage {
        self.stage
    }

    /// Whether the fallback edge has been taken.
    pub fn fell_back(&self) -> bool {
        self.fell_back
    }

    pub fn can_transition(&self, to: ExportStage) -> bool {
        use ExportStage::*;
        match (self.stage, to) {
            (from, Failed) => !from.is_terminal(),
            (Idle, Initializing) => true,
            (Initializing, Rendering) | (Initializing, Encoding) => true,
            (Rendering, Encoding) => true,
            (Encoding, Complete) => true,
            (Encoding, Rendering) => self.format == ExportFormat::Webm && !self.fell_back,
            _ => false,
        }
    }

    pub fn transition(&mut self, to: ExportStage) -> ClipweaveResult<()> {
        if !self.can_transition(to) {
            return Err(ClipweaveError::render(format!(
                "invalid export stage transition {} -> {}",
                self.stage, to
            )));
        }
        if self.stage == ExportStage::Encoding && to == ExportStage::Rendering {
            self.fell_back = true;
        }
        tracing::debug!(from = %self.stage, to = %to, "Export stage transition");
        self.stage = to;
        Ok(())
    }
}
