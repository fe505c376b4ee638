//! Delegated whole-sequence transcode through one ffmpeg run.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use clipweave_common::config::FfmpegConfig;
use clipweave_common::error::{ClipweaveError, ClipweaveResult};
use clipweave_sequence_model::clip::{BlurRegion, ClipDescriptor, RegionShape};
use clipweave_sequence_model::geometry::{fit_content, region_bounds, PixelRect};
use clipweave_sequence_model::settings::{ExportFormat, ExportSettings};

use crate::blur::kernel_radius;
use crate::ffmpeg::{self, command_exists};
use crate::progress::{ProgressReporter, TRANSCODE_BAND};
use crate::source::{MediaSource, SourceInfo};

/// One clip handed to the delegated pipeline.
#[derive(Debug, Clone)]
pub struct TranscodeInput<'a> {
    pub clip: &'a ClipDescriptor,
    pub path: &'a Path,
    pub info: SourceInfo,
}

/// Everything a [`BatchTranscoder`] needs for one export.
#[derive(Debug, Clone)]
pub struct TranscodeJob<'a> {
    pub inputs: Vec<TranscodeInput<'a>>,
    pub settings: &'a ExportSettings,
    pub total_duration: f64,
    pub total_frames: u64,
}

impl<'a> TranscodeJob<'a> {
    /// Pair clips with their preloaded sources.
    ///
    /// Fails with a transcode error when a source is not file-backed.
    pub fn new(
        clips: &'a [ClipDescriptor],
        sources: &'a [Box<dyn MediaSource>],
        infos: &[SourceInfo],
        settings: &'a ExportSettings,
        total_duration: f64,
        total_frames: u64,
    ) -> ClipweaveResult<Self> {
        let inputs = clips
            .iter()
            .zip(sources)
            .zip(infos)
            .map(|((clip, source), info)| {
                let path = source.location().ok_or_else(|| {
                    ClipweaveError::transcode(format!(
                        "clip '{}' is not backed by a file",
                        clip.id
                    ))
                })?;
                Ok(TranscodeInput {
                    clip,
                    path,
                    info: *info,
                })
            })
            .collect::<ClipweaveResult<Vec<_>>>()?;

        Ok(Self {
            inputs,
            settings,
            total_duration,
            total_frames,
        })
    }
}

/// A backend that turns clip files into an encoded video in one pass.
#[async_trait]
pub trait BatchTranscoder: Send + Sync {
    fn name(&self) -> &str;

    /// Check if the backend's tooling is present.
    fn is_available(&self) -> bool;

    /// Produce the encoded bytes, reporting into the transcode band.
    async fn transcode(
        &self,
        job: &TranscodeJob<'_>,
        progress: &mut ProgressReporter,
    ) -> ClipweaveResult<Vec<u8>>;
}

/// Video bitrate: twice the pixel count in kbps, clamped to 2-8 Mbps,
/// scaled by quality and floored at 100 kbps.
pub fn target_bitrate_kbps(width: u32, height: u32, quality: u8) -> u32 {
    let pixels = width as f64 * height as f64;
    let base = (2.0 * pixels / 1000.0).clamp(2000.0, 8000.0);
    let scaled = base * quality.min(100) as f64 / 100.0;
    (scaled.round() as u32).max(100)
}

/// Build the `-filter_complex` graph for `inputs`, ending in `[vout]`.
pub fn build_filter_graph(inputs: &[TranscodeInput<'_>], settings: &ExportSettings) -> String {
    let (w, h) = (settings.width, settings.height);
    let mut chains = Vec::with_capacity(inputs.len() + 1);

    for (i, input) in inputs.iter().enumerate() {
        let effects = &input.clip.effects;
        let mut chain = format!(
            "[{i}:v]trim=duration={dur:.6},setpts=(PTS-STARTPTS)/{speed:.6},\
             scale={w}:{h}:force_original_aspect_ratio=decrease",
            dur = input.clip.duration_secs,
            speed = effects.speed,
        );

        // Blur before padding so the bars stay black.
        if let Some(sigma) = effects.effective_global_blur() {
            chain.push_str(&format!(",gblur=sigma={sigma:.3}"));
        }
        chain.push_str(&format!(
            ",pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1"
        ));

        if effects.selective_blur_regions.is_empty() {
            chain.push_str(&format!(",fps={}[v{i}]", settings.fps));
            chains.push(chain);
            continue;
        }

        let content = fit_content(input.info.width, input.info.height, w, h);
        let mut current = format!("c{i}_0");
        chain.push_str(&format!("[{current}]"));
        chains.push(chain);

        for (j, region) in effects.selective_blur_regions.iter().enumerate() {
            let next = format!("c{i}_{}", j + 1);
            if let Some(overlay) = region_overlay(region, &content, &current, &next, &format!("{i}_{j}")) {
                chains.push(overlay);
                current = next;
            }
        }
        chains.push(format!("[{current}]fps={}[v{i}]", settings.fps));
    }

    let labels: String = (0..inputs.len()).map(|i| format!("[v{i}]")).collect();
    chains.push(format!("{labels}concat=n={}:v=1:a=0[vout]", inputs.len()));
    chains.join(";")
}

/// Blur one region of `[input]` and overlay it back, producing `[output]`.
fn region_overlay(
    region: &BlurRegion,
    content: &PixelRect,
    input: &str,
    output: &str,
    tag: &str,
) -> Option<String> {
    let bounds = region_bounds(region, content);
    let radius = kernel_radius(region.intensity);
    if bounds.is_empty() || radius == 0 {
        return None;
    }

    let sample = bounds.expand_within(radius, content);
    let mut blurred = format!(
        "[{input}]split[base{tag}][src{tag}];\
         [src{tag}]crop={sw}:{sh}:{sx}:{sy},gblur=sigma={sigma:.3},crop={bw}:{bh}:{ox}:{oy}",
        sw = sample.width,
        sh = sample.height,
        sx = sample.x,
        sy = sample.y,
        sigma = region.intensity,
        bw = bounds.width,
        bh = bounds.height,
        ox = bounds.x - sample.x,
        oy = bounds.y - sample.y,
    );

    if region.shape == RegionShape::Circle {
        let r = bounds.width.min(bounds.height) as f64 / 2.0;
        let (cx, cy) = (bounds.width as f64 / 2.0, bounds.height as f64 / 2.0);
        blurred.push_str(&format!(
            ",format=rgba,geq=r='r(X,Y)':g='g(X,Y)':b='b(X,Y)':\
             a='if(lte(hypot(X+0.5-{cx:.3},Y+0.5-{cy:.3}),{r:.3}),255,0)'"
        ));
    }

    Some(format!(
        "{blurred}[blur{tag}];[base{tag}][blur{tag}]overlay={x}:{y}[{output}]",
        x = bounds.x,
        y = bounds.y,
    ))
}

fn codec_args(format: ExportFormat, bitrate_kbps: u32) -> Vec<String> {
    let bitrate = format!("{bitrate_kbps}k");
    let args: &[&str] = match format {
        ExportFormat::Webm => &["-c:v", "libvpx-vp9", "-pix_fmt", "yuv420p", "-b:v"],
        ExportFormat::Mp4 | ExportFormat::Gif => &[
            "-c:v",
            "libx264",
            "-preset",
            "medium",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
            "-b:v",
        ],
    };
    let mut args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    args.push(bitrate);
    args
}

/// Full ffmpeg argument list writing to `output`.
pub fn build_args(job: &TranscodeJob<'_>, output: &Path) -> Vec<String> {
    let settings = job.settings;
    let mut args: Vec<String> = ["-y", "-hide_banner", "-nostats", "-progress", "pipe:1"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    for input in &job.inputs {
        args.push("-i".to_string());
        args.push(input.path.display().to_string());
    }

    args.push("-filter_complex".to_string());
    args.push(build_filter_graph(&job.inputs, settings));
    args.extend(["-map", "[vout]", "-an", "-r"].iter().map(|s| s.to_string()));
    args.push(settings.fps.to_string());
    args.extend(codec_args(
        settings.format,
        target_bitrate_kbps(settings.width, settings.height, settings.quality),
    ));
    args.push(output.display().to_string());
    args
}

/// [`BatchTranscoder`] backed by the ffmpeg command-line tool.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    tools: FfmpegConfig,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(tools: FfmpegConfig, timeout: Duration) -> Self {
        Self { tools, timeout }
    }

    async fn run(
        &self,
        job: &TranscodeJob<'_>,
        output: &Path,
        progress: &mut ProgressReporter,
    ) -> ClipweaveResult<Vec<u8>> {
        let args = build_args(job, output);
        let expected = job.total_duration;
        let total_frames = job.total_frames;

        ffmpeg::run_with_progress(&self.tools.ffmpeg_bin, &args, self.timeout, |state| {
            let fraction = state.fraction(expected);
            progress.set_frames_rendered((fraction * total_frames as f64).round() as u64);
            progress.report_in(TRANSCODE_BAND, fraction);
        })
        .await?;

        let bytes = tokio::fs::read(output)
            .await
            .map_err(|e| ClipweaveError::transcode(format!("Failed to read transcode output: {e}")))?;
        if bytes.is_empty() {
            return Err(ClipweaveError::transcode("ffmpeg produced an empty output file"));
        }
        Ok(bytes)
    }
}

#[async_trait]
impl BatchTranscoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn is_available(&self) -> bool {
        command_exists(&self.tools.ffmpeg_bin)
    }

    async fn transcode(
        &self,
        job: &TranscodeJob<'_>,
        progress: &mut ProgressReporter,
    ) -> ClipweaveResult<Vec<u8>> {
        let binary = self.tools.ffmpeg_bin.clone();
        let available = tokio::task::spawn_blocking(move || command_exists(&binary))
            .await
            .unwrap_or(false);
        if !available {
            return Err(ClipweaveError::transcode(format!(
                "{} not found on PATH",
                self.tools.ffmpeg_bin
            )));
        }

        let scratch = tempfile::Builder::new()
            .prefix("clipweave-transcode-")
            .tempdir()
            .map_err(|e| ClipweaveError::transcode(format!("Failed to create scratch dir: {e}")))?;
        let output = scratch
            .path()
            .join(format!("output.{}", job.settings.format.extension()));

        tracing::info!(
            clips = job.inputs.len(),
            width = job.settings.width,
            height = job.settings.height,
            fps = job.settings.fps,
            format = job.settings.format.extension(),
            bitrate_kbps = target_bitrate_kbps(
                job.settings.width,
                job.settings.height,
                job.settings.quality
            ),
            "Starting delegated transcode"
        );

        let result = self.run(job, &output, progress).await;

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            tracing::warn!(
                path = %scratch_path.display(),
                error = %e,
                "Failed to remove transcode scratch directory"
            );
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn info(width: u32, height: u32) -> SourceInfo {
        SourceInfo {
            width,
            height,
            duration_secs: 4.0,
        }
    }

    #[test]
    fn test_bitrate_formula() {
        // 1280x720: 1843 kbps, clamped up to 2000.
        assert_eq!(target_bitrate_kbps(1280, 720, 100), 2000);
        // 1920x1080: 4147 kbps.
        assert_eq!(target_bitrate_kbps(1920, 1080, 100), 4147);
        assert_eq!(target_bitrate_kbps(1920, 1080, 50), 2074);
        // 4k clamps to 8000.
        assert_eq!(target_bitrate_kbps(3840, 2160, 100), 8000);
        // Floor.
        assert_eq!(target_bitrate_kbps(640, 360, 1), 100);
        assert_eq!(target_bitrate_kbps(640, 360, 0), 100);
    }

    #[test]
    fn test_filter_graph_retimes_and_concatenates() {
        let a = ClipDescriptor::new("a", "a.mp4", 4.0);
        let b = ClipDescriptor::new("b", "b.mp4", 2.0).with_speed(2.0).with_blur(6.0);
        let (pa, pb) = (PathBuf::from("a.mp4"), PathBuf::from("b.mp4"));
        let inputs = vec![
            TranscodeInput {
                clip: &a,
                path: &pa,
                info: info(1920, 1080),
            },
            TranscodeInput {
                clip: &b,
                path: &pb,
                info: info(1920, 1080),
            },
        ];
        let settings = ExportSettings::new(1280, 720, 30, ExportFormat::Mp4, 80);
        let graph = build_filter_graph(&inputs, &settings);

        assert!(graph.starts_with("[0:v]trim=duration=4.000000,setpts=(PTS-STARTPTS)/1.000000"));
        assert!(graph.contains("[1:v]trim=duration=2.000000,setpts=(PTS-STARTPTS)/2.000000"));
        assert!(graph.contains("pad=1280:720:(ow-iw)/2:(oh-ih)/2:color=black"));
        assert!(graph.contains(
            "scale=1280:720:force_original_aspect_ratio=decrease,gblur=sigma=6.000,\
             pad=1280:720:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1,fps=30[v1]"
        ));
        assert!(graph.contains("setsar=1,fps=30[v0]"));
        assert!(graph.ends_with("[v0][v1]concat=n=2:v=1:a=0[vout]"));
    }

    #[test]
    fn test_letterboxed_blur_never_samples_bars() {
        let wide = ClipDescriptor::new("wide", "wide.mp4", 2.0).with_blur(4.0);
        let regioned = ClipDescriptor::new("r", "r.mp4", 2.0).with_region(BlurRegion {
            x_pct: 0.0,
            y_pct: 0.0,
            width_pct: 100.0,
            height_pct: 10.0,
            shape: RegionShape::Rect,
            intensity: 2.0,
        });
        let (pw, pr) = (PathBuf::from("wide.mp4"), PathBuf::from("r.mp4"));
        let inputs = vec![
            TranscodeInput {
                clip: &wide,
                path: &pw,
                info: info(64, 32),
            },
            TranscodeInput {
                clip: &regioned,
                path: &pr,
                info: info(64, 32),
            },
        ];
        let settings = ExportSettings::new(64, 64, 10, ExportFormat::Mp4, 80);
        let graph = build_filter_graph(&inputs, &settings);

        let first = graph.split(';').next().unwrap();
        let blur_at = first.find("gblur").unwrap();
        let pad_at = first.find("pad=").unwrap();
        assert!(blur_at < pad_at, "global blur must run before padding: {first}");

        // Content is 64x32 at y=16; the region's top margin is clamped to it.
        assert!(graph.contains("crop=64:9:0:16,gblur=sigma=2.000,crop=64:3:0:0"));
    }

    #[test]
    fn test_regions_suppress_global_blur_in_graph() {
        let clip = ClipDescriptor::new("a", "a.mp4", 3.0)
            .with_blur(9.0)
            .with_region(BlurRegion {
                x_pct: 0.0,
                y_pct: 0.0,
                width_pct: 50.0,
                height_pct: 50.0,
                shape: RegionShape::Circle,
                intensity: 4.0,
            });
        let path = PathBuf::from("a.mp4");
        let inputs = vec![TranscodeInput {
            clip: &clip,
            path: &path,
            info: info(1280, 720),
        }];
        let settings = ExportSettings::new(1280, 720, 24, ExportFormat::Webm, 80);
        let graph = build_filter_graph(&inputs, &settings);

        assert!(!graph.contains("gblur=sigma=9.000"));
        assert!(graph.contains("split[base0_0][src0_0]"));
        // Region box 640x360 at the origin, sampled with a 12px margin.
        assert!(graph.contains("crop=652:372:0:0,gblur=sigma=4.000,crop=640:360:0:0"));
        assert!(graph.contains("geq="));
        assert!(graph.contains("[base0_0][blur0_0]overlay=0:0[c0_1]"));
        assert!(graph.contains("[c0_1]fps=24[v0]"));
    }

    #[test]
    fn test_args_select_codec_and_bitrate() {
        let clip = ClipDescriptor::new("a", "a.mp4", 1.0);
        let path = PathBuf::from("/media/a.mp4");
        let settings = ExportSettings::new(1920, 1080, 30, ExportFormat::Webm, 100);
        let job = TranscodeJob {
            inputs: vec![TranscodeInput {
                clip: &clip,
                path: &path,
                info: info(1920, 1080),
            }],
            settings: &settings,
            total_duration: 1.0,
            total_frames: 30,
        };
        let args = build_args(&job, Path::new("/tmp/out.webm"));

        assert!(args.windows(2).any(|w| w == ["-i", "/media/a.mp4"]));
        assert!(args.windows(2).any(|w| w == ["-c:v", "libvpx-vp9"]));
        assert!(args.windows(2).any(|w| w == ["-b:v", "4147k"]));
        assert!(args.contains(&"-an".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/out.webm");

        let mp4 = ExportSettings::new(1920, 1080, 30, ExportFormat::Mp4, 100);
        let job = TranscodeJob {
            settings: &mp4,
            ..job
        };
        let args = build_args(&job, Path::new("/tmp/out.mp4"));
        assert!(args.windows(2).any(|w| w == ["-c:v", "libx264"]));
        assert!(args.windows(2).any(|w| w == ["-movflags", "+faststart"]));
    }
}
