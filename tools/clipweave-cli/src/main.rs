//! Clipweave CLI: export clip sequences to GIF, MP4 or WebM.
//!
//! Usage:
//!   clipweave export <SEQUENCE> [OPTIONS]   Export a sequence
//!   clipweave plan <SEQUENCE> [--fps N]     Show the frame schedule
//!   clipweave validate <SEQUENCE>           Validate a sequence file
//!   clipweave check                         Check ffmpeg tooling

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clipweave_sequence_model::settings::ExportFormat;

mod commands;

#[derive(Parser)]
#[command(
    name = "clipweave",
    about = "Stitch clip sequences into a single GIF, MP4 or WebM",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Engine config file (defaults to the user config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a sequence to a media file
    Export {
        /// Path to the sequence JSON file
        sequence: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format: gif, mp4 or webm
        #[arg(long, default_value = "mp4")]
        format: ExportFormat,

        /// Output width
        #[arg(long, default_value = "1280")]
        width: u32,

        /// Output height
        #[arg(long, default_value = "720")]
        height: u32,

        /// Output frame rate
        #[arg(long, default_value = "30")]
        fps: u32,

        /// Quality 0-100 (scales bitrate)
        #[arg(long, default_value = "80")]
        quality: u8,
    },

    /// Print the frame schedule of a sequence
    Plan {
        /// Path to the sequence JSON file
        sequence: PathBuf,

        /// Frame rate to schedule at
        #[arg(long, default_value = "30")]
        fps: u32,

        /// Also list the first N frame slots
        #[arg(long, default_value = "0")]
        frames: u64,
    },

    /// Validate a sequence file
    Validate {
        /// Path to the sequence JSON file
        sequence: PathBuf,
    },

    /// Check ffmpeg tooling and encoders
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => clipweave_common::config::EngineConfig::load_from(path)?,
        None => clipweave_common::config::EngineConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if cli.json_logs {
        config.logging.json = true;
    }
    clipweave_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Export {
            sequence,
            output,
            format,
            width,
            height,
            fps,
            quality,
        } => {
            let options = commands::export::ExportOptions {
                output,
                format,
                width,
                height,
                fps,
                quality,
            };
            commands::export::run(config, sequence, options).await
        }
        Commands::Plan {
            sequence,
            fps,
            frames,
        } => commands::plan::run(sequence, fps, frames),
        Commands::Validate { sequence } => commands::validate::run(sequence),
        Commands::Check => commands::check::run(&config).await,
    }
}
