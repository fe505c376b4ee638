//! Export a sequence to a media file.

use std::io::Write;
use std::path::{Path, PathBuf};

use clipweave_common::config::EngineConfig;
use clipweave_render_engine::{ExportEngine, ExportProgress, ProgressCallback};
use clipweave_sequence_model::settings::{ExportFormat, ExportSettings};

pub struct ExportOptions {
    pub output: Option<PathBuf>,
    pub format: ExportFormat,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub quality: u8,
}

/// `<sequence dir>/export.<ext>`
fn default_output(sequence_path: &Path, format: ExportFormat) -> PathBuf {
    sequence_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!("export.{}", format.extension()))
}

pub async fn run(
    config: EngineConfig,
    sequence_path: PathBuf,
    options: ExportOptions,
) -> anyhow::Result<()> {
    println!("Exporting sequence at: {}", sequence_path.display());

    let sequence = super::load_sequence(&sequence_path)?;
    let output_path = options
        .output
        .unwrap_or_else(|| default_output(&sequence_path, options.format));

    let settings = ExportSettings::new(
        options.width,
        options.height,
        options.fps,
        options.format,
        options.quality,
    );

    println!("  Clips: {}", sequence.len());
    println!("  Duration: {:.2}s", sequence.total_duration());
    println!("  Output: {}", output_path.display());
    println!("  Format: {}", settings.format.media_type());
    println!(
        "  Resolution: {}x{} @ {} fps (quality {})",
        settings.width, settings.height, settings.fps, settings.quality
    );

    let progress_cb: ProgressCallback = Box::new(|p: ExportProgress| {
        print!(
            "\r  Progress: {:>5.1}% [{}] ({}/{} frames)  ",
            p.percent, p.stage, p.frames_rendered, p.total_frames,
        );
        let _ = std::io::stdout().flush();
    });

    let engine = ExportEngine::new(config);
    let output = match engine.export(&sequence, &settings, Some(progress_cb)).await {
        Ok(output) => output,
        Err(e) => {
            println!();
            return Err(anyhow::anyhow!("Export failed: {e}"));
        }
    };

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&output_path, &output.bytes)?;

    println!("\nExport complete: {}", output_path.display());
    println!("  Media type: {}", output.media_type);
    println!("  Backend: {}", output.backend);
    println!("  Size: {} bytes", output.bytes.len());
    if output.fell_back {
        println!("  Note: delegated transcode failed; recorded via frame capture");
    }
    if output.blank_frames > 0 {
        println!("  Warning: {} frame(s) were background only", output.blank_frames);
    }
    if output.seek_shortfalls > 0 {
        println!(
            "  Warning: {} frame(s) were captured before their seek settled",
            output.seek_shortfalls
        );
    }

    tracing::debug!(summary = %serde_json::to_string(&output)?, "Export summary");
    Ok(())
}
