//! Check ffmpeg tooling and encoders.

use clipweave_common::config::EngineConfig;
use clipweave_render_engine::backend::live::LiveCodec;
use clipweave_render_engine::ffmpeg;

const BATCH_ENCODERS: [&str; 2] = ["libx264", "libvpx-vp9"];

pub async fn run(config: &EngineConfig) -> anyhow::Result<()> {
    println!("Clipweave System Check");
    println!("{}", "=".repeat(50));

    let tools = &config.ffmpeg;
    let ffmpeg_ok = ffmpeg::command_exists(&tools.ffmpeg_bin);
    let ffprobe_ok = ffmpeg::command_exists(&tools.ffprobe_bin);
    report(ffmpeg_ok, &format!("ffmpeg binary: {}", tools.ffmpeg_bin));
    report(ffprobe_ok, &format!("ffprobe binary: {}", tools.ffprobe_bin));

    let mut all_ok = ffmpeg_ok && ffprobe_ok;
    if ffmpeg_ok {
        let encoders = ffmpeg::list_encoders(&tools.ffmpeg_bin).await?;
        println!();
        println!("Batch transcode encoders:");
        for name in BATCH_ENCODERS {
            let present = encoders.iter().any(|e| e == name);
            all_ok &= present;
            report(present, name);
        }

        println!();
        println!("Live recorder codecs (in preference order):");
        let live: Vec<LiveCodec> = LiveCodec::PREFERENCE
            .into_iter()
            .filter(|codec| encoders.iter().any(|e| e == codec.encoder()))
            .collect();
        for codec in LiveCodec::PREFERENCE {
            report(live.contains(&codec), codec.encoder());
        }
        if live.is_empty() {
            all_ok = false;
        }
    }

    println!();
    println!("GIF encoder workers: {}", config.gif.worker_count());

    println!();
    if all_ok {
        println!("All exports are available. Clipweave is ready.");
    } else {
        println!("Some tooling is missing. GIF export may still work; see above.");
    }

    Ok(())
}

fn report(ok: bool, what: &str) {
    if ok {
        println!("[OK] {what}");
    } else {
        println!("[MISSING] {what}");
    }
}
