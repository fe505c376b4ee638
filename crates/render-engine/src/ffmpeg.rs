//! Thin async wrappers around the `ffmpeg` / `ffprobe` command-line tools.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use clipweave_common::error::{ClipweaveError, ClipweaveResult};
use image::RgbaImage;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

/// Check whether `binary` can be executed (absolute path or name on PATH).
///
/// Resolves the name directly against PATH; no shell is involved.
pub fn command_exists(binary: &str) -> bool {
    which::which(binary).is_ok()
}

/// Stream facts reported by ffprobe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbedMedia {
    pub width: u32,
    pub height: u32,
    pub duration_secs: Option<f64>,
}

/// Probe the first video stream of `path`.
pub async fn probe_media(ffprobe_bin: &str, path: &Path) -> anyhow::Result<ProbedMedia> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        #[serde(default)]
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let out = tokio::process::Command::new(ffprobe_bin)
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("failed to run {ffprobe_bin}"))?;
    if !out.status.success() {
        bail!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        );
    }

    let parsed: ProbeOut =
        serde_json::from_slice(&out.stdout).context("ffprobe json parse failed")?;
    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| anyhow!("no video stream found"))?;

    let width = stream.width.filter(|w| *w > 0);
    let height = stream.height.filter(|h| *h > 0);
    let (Some(width), Some(height)) = (width, height) else {
        bail!("video stream has no usable dimensions");
    };

    let duration_secs = stream
        .duration
        .as_deref()
        .or(parsed.format.as_ref().and_then(|f| f.duration.as_deref()))
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);

    Ok(ProbedMedia {
        width,
        height,
        duration_secs,
    })
}

/// Decode the frame at `position_secs` as a `width x height` RGBA raster.
pub async fn decode_frame(
    ffmpeg_bin: &str,
    path: &Path,
    position_secs: f64,
    width: u32,
    height: u32,
) -> anyhow::Result<RgbaImage> {
    let out = tokio::process::Command::new(ffmpeg_bin)
        .args(["-v", "error", "-ss", &format!("{position_secs:.6}")])
        .arg("-i")
        .arg(path)
        .args(["-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("failed to run {ffmpeg_bin} for frame decode"))?;

    if !out.status.success() {
        bail!(
            "frame decode failed for '{}' at {position_secs:.3}s: {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        );
    }

    let expected_len = width as usize * height as usize * 4;
    if out.stdout.len() < expected_len {
        bail!(
            "decoded frame is truncated: got {} bytes, expected {expected_len}",
            out.stdout.len()
        );
    }

    let mut raw = out.stdout;
    raw.truncate(expected_len);
    RgbaImage::from_raw(width, height, raw)
        .ok_or_else(|| anyhow!("decoded frame does not match {width}x{height}"))
}

/// Names of all encoders the local ffmpeg build offers.
pub async fn list_encoders(ffmpeg_bin: &str) -> anyhow::Result<Vec<String>> {
    let out = tokio::process::Command::new(ffmpeg_bin)
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("failed to run {ffmpeg_bin} -encoders"))?;
    if !out.status.success() {
        bail!("{ffmpeg_bin} -encoders exited with {}", out.status);
    }
    Ok(parse_encoder_list(&String::from_utf8_lossy(&out.stdout)))
}

/// Parse the table printed by `ffmpeg -encoders`.
fn parse_encoder_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .skip_while(|line| line.trim() != "------")
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
        .collect()
}

/// Latest values from ffmpeg's `-progress` key/value stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProgressState {
    pub out_time_secs: f64,
    pub complete: bool,
}

impl ProgressState {
    pub fn update(&mut self, key: &str, value: &str) {
        match key {
            // Both keys carry microseconds despite the name.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }

    /// Fraction of `expected_duration_secs` already written, in `[0, 1]`.
    pub fn fraction(&self, expected_duration_secs: f64) -> f64 {
        if self.complete {
            return 1.0;
        }
        if expected_duration_secs <= 0.0 {
            return 0.0;
        }
        (self.out_time_secs / expected_duration_secs).clamp(0.0, 1.0)
    }
}

/// Run ffmpeg with `-progress pipe:1` style arguments, reporting each
/// progress block and killing the process once `timeout` elapses.
pub async fn run_with_progress<F>(
    ffmpeg_bin: &str,
    args: &[String],
    timeout: Duration,
    mut on_progress: F,
) -> ClipweaveResult<()>
where
    F: FnMut(&ProgressState) + Send,
{
    tracing::debug!(args = ?args, "Running ffmpeg");
    let mut child = tokio::process::Command::new(ffmpeg_bin)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ClipweaveError::transcode(format!("Failed to start ffmpeg: {e}")))?;

    tracing::info!(pid = child.id(), args_len = args.len(), "ffmpeg process started");

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ClipweaveError::transcode("Failed to capture ffmpeg stdout"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| ClipweaveError::transcode("Failed to capture ffmpeg stderr"))?;

    // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
    let stderr_task = tokio::spawn(async move {
        let mut output = String::new();
        match stderr.read_to_string(&mut output).await {
            Ok(_) => output,
            Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
        }
    });

    let run = tokio::time::timeout(timeout, async {
        let mut lines = BufReader::new(stdout).lines();
        let mut state = ProgressState::default();
        while let Some(line) = lines.next_line().await? {
            if let Some((key, value)) = line.trim().split_once('=') {
                state.update(key, value);
                if key == "progress" {
                    on_progress(&state);
                }
            }
        }
        child.wait().await
    })
    .await;

    let status = match run {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            return Err(ClipweaveError::transcode(format!(
                "Failed waiting on ffmpeg: {e}"
            )))
        }
        Err(_) => {
            tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "ffmpeg timed out, killing process"
            );
            let _ = child.kill().await;
            stderr_task.abort();
            return Err(ClipweaveError::transcode(format!(
                "ffmpeg timed out after {}s",
                timeout.as_secs()
            )));
        }
    };

    let stderr_output = stderr_task
        .await
        .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

    if !status.success() {
        return Err(ClipweaveError::transcode(format!(
            "ffmpeg exited with {status}: {}",
            tail(&stderr_output, 20)
        )));
    }

    Ok(())
}

/// Last `lines` lines of `text`, trimmed.
fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim().lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
