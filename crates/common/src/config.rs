//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ClipweaveError, ClipweaveResult};

/// Global engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Seek controller policy.
    pub seek: SeekConfig,

    /// Timeouts for every phase that waits on an external worker.
    pub timeouts: TimeoutConfig,

    /// External binaries used by the delegated pipeline and recorder.
    pub ffmpeg: FfmpegConfig,

    /// Animated-image encoder settings.
    pub gif: GifEncoderConfig,
}

/// Bounded-retry seek policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeekConfig {
    /// Accepted distance between requested and reached position (seconds).
    pub tolerance_secs: f64,

    /// Number of times a seek is (re)issued before giving up.
    pub max_attempts: u32,

    /// Readiness polls within one attempt.
    pub polls_per_attempt: u32,

    /// Delay between readiness polls (milliseconds).
    pub poll_interval_ms: u64,

    /// Delay between attempts (milliseconds).
    pub retry_delay_ms: u64,
}

/// Timeout policy shared by all export backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-clip source preload bound.
    pub preload_secs: u64,

    /// Bound on the delegated whole-sequence transcode.
    pub transcode_secs: u64,

    /// Bound on animated-image encoding after the last frame is queued.
    pub gif_encode_secs: u64,

    /// Bound on finalizing the live recorder output.
    pub recorder_finalize_secs: u64,

    /// Delay after the last presented frame before capture stops.
    pub recorder_settle_ms: u64,
}

/// Locations of external media tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    /// ffmpeg binary (name on PATH or absolute path).
    pub ffmpeg_bin: String,

    /// ffprobe binary (name on PATH or absolute path).
    pub ffprobe_bin: String,
}

/// Animated-image encoder tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GifEncoderConfig {
    /// Worker count for palette quantization (0 = available parallelism).
    pub workers: usize,

    /// Quantizer speed, 1 (best) to 30 (fastest).
    pub quantize_speed: i32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "clipweave=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for SeekConfig {
    fn default() -> Self {
        Self {
            tolerance_secs: 0.1,
            max_attempts: 3,
            polls_per_attempt: 10,
            poll_interval_ms: 50,
            retry_delay_ms: 100,
        }
    }
}

impl SeekConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            preload_secs: 30,
            transcode_secs: 600,
            gif_encode_secs: 120,
            recorder_finalize_secs: 60,
            recorder_settle_ms: 500,
        }
    }
}

impl TimeoutConfig {
    pub fn preload(&self) -> Duration {
        Duration::from_secs(self.preload_secs)
    }

    pub fn transcode(&self) -> Duration {
        Duration::from_secs(self.transcode_secs)
    }

    pub fn gif_encode(&self) -> Duration {
        Duration::from_secs(self.gif_encode_secs)
    }

    pub fn recorder_finalize(&self) -> Duration {
        Duration::from_secs(self.recorder_finalize_secs)
    }

    pub fn recorder_settle(&self) -> Duration {
        Duration::from_millis(self.recorder_settle_ms)
    }
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
        }
    }
}

impl Default for GifEncoderConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            quantize_speed: 10,
        }
    }
}

impl GifEncoderConfig {
    /// Resolved worker count (never zero).
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl EngineConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if !config_path.exists() {
            return Self::default();
        }
        match Self::load_from(&config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %config_path.display(), error = %e, "Using default config");
                Self::default()
            }
        }
    }

    /// Load config from an explicit file.
    pub fn load_from(path: &Path) -> ClipweaveResult<Self> {
        if !path.is_file() {
            return Err(ClipweaveError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| ClipweaveError::Config {
            message: format!("{}: {e}", path.display()),
        })
    }

    /// Save config to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> ClipweaveResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Save config to the standard location.
    pub fn save(&self) -> ClipweaveResult<()> {
        self.save_to(&config_file_path())
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("clipweave").join("config.json")
}
