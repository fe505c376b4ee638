//! Bounded-retry seeking.
//!
//! [`SeekAttempt`] is the pure policy: it is fed each observed
//! [`Readiness`] and answers with the next [`SeekStep`]. [`SeekController`]
//! drives it against a live [`MediaSource`], sleeping between polls.
//! Running out of attempts is a soft failure: capture proceeds with
//! whatever frame the source holds.

use std::time::Duration;

use clipweave_common::config::SeekConfig;

use crate::source::{MediaSource, Readiness};

/// What the driver should do next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekStep {
    /// Wait, then poll readiness again.
    Poll(Duration),
    /// Wait, then re-issue the seek and start a new attempt.
    Reissue(Duration),
    /// Stop seeking.
    Done(SeekOutcome),
}

/// Final result of a seek.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekOutcome {
    /// The source landed within tolerance.
    Ready { attempts: u32, position_secs: f64 },
    /// Attempts were exhausted; `last_position` is the last reported landing.
    Shortfall {
        attempts: u32,
        last_position: Option<f64>,
    },
}

impl SeekOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, SeekOutcome::Ready { .. })
    }

    pub fn attempts(&self) -> u32 {
        match *self {
            SeekOutcome::Ready { attempts, .. } | SeekOutcome::Shortfall { attempts, .. } => {
                attempts
            }
        }
    }
}

/// State of one seek towards a fixed target.
#[derive(Debug, Clone)]
pub struct SeekAttempt {
    target_secs: f64,
    tolerance_secs: f64,
    max_attempts: u32,
    polls_per_attempt: u32,
    poll_interval: Duration,
    retry_delay: Duration,
    attempt: u32,
    polls: u32,
    last_position: Option<f64>,
}

impl SeekAttempt {
    pub fn new(config: &SeekConfig, target_secs: f64) -> Self {
        Self {
            target_secs,
            tolerance_secs: config.tolerance_secs.max(0.0),
            max_attempts: config.max_attempts.max(1),
            polls_per_attempt: config.polls_per_attempt.max(1),
            poll_interval: config.poll_interval(),
            retry_delay: config.retry_delay(),
            attempt: 1,
            polls: 0,
            last_position: None,
        }
    }

    pub fn target_secs(&self) -> f64 {
        self.target_secs
    }

    /// 1-based number of the attempt in progress.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Advance the policy with the latest observation.
    pub fn observe(&mut self, readiness: &Readiness) -> SeekStep {
        match readiness {
            Readiness::Ready { position_secs } => {
                self.last_position = Some(*position_secs);
                if (position_secs - self.target_secs).abs() <= self.tolerance_secs {
                    SeekStep::Done(SeekOutcome::Ready {
                        attempts: self.attempt,
                        position_secs: *position_secs,
                    })
                } else {
                    self.next_attempt()
                }
            }
            Readiness::Failed { .. } => self.next_attempt(),
            Readiness::Pending => {
                self.polls += 1;
                if self.polls < self.polls_per_attempt {
                    SeekStep::Poll(self.poll_interval)
                } else {
                    self.next_attempt()
                }
            }
        }
    }

    fn next_attempt(&mut self) -> SeekStep {
        if self.attempt >= self.max_attempts {
            return SeekStep::Done(SeekOutcome::Shortfall {
                attempts: self.attempt,
                last_position: self.last_position,
            });
        }
        self.attempt += 1;
        self.polls = 0;
        SeekStep::Reissue(self.retry_delay)
    }
}

/// Positions sources before capture.
#[derive(Debug, Clone, Default)]
pub struct SeekController {
    config: SeekConfig,
}

impl SeekController {
    pub fn new(config: SeekConfig) -> Self {
        Self { config }
    }

    /// Seek `source` to `target_secs` and wait until it is ready or the
    /// attempt budget runs out.
    pub async fn seek(&self, source: &mut dyn MediaSource, target_secs: f64) -> SeekOutcome {
        let mut attempt = SeekAttempt::new(&self.config, target_secs);
        source.seek(target_secs);

        loop {
            let readiness = source.readiness().await;
            if let Readiness::Failed { message } = &readiness {
                tracing::debug!(
                    clip_id = %source.clip_id(),
                    target_secs,
                    attempt = attempt.attempt(),
                    error = %message,
                    "Seek decode failed"
                );
            }

            match attempt.observe(&readiness) {
                SeekStep::Poll(wait) => tokio::time::sleep(wait).await,
                SeekStep::Reissue(wait) => {
                    tokio::time::sleep(wait).await;
                    source.seek(target_secs);
                }
                SeekStep::Done(outcome) => {
                    if let SeekOutcome::Shortfall {
                        attempts,
                        last_position,
                    } = outcome
                    {
                        tracing::warn!(
                            clip_id = %source.clip_id(),
                            target_secs,
                            attempts,
                            last_position = ?last_position,
                            "Seek did not settle within tolerance; capturing current frame"
                        );
                    }
                    return outcome;
                }
            }
        }
    }
}
