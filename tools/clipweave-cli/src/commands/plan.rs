//! Print the frame schedule of a sequence.

use std::path::PathBuf;

use clipweave_render_engine::schedule::FrameScheduler;

pub fn run(sequence_path: PathBuf, fps: u32, frames: u64) -> anyhow::Result<()> {
    let sequence = super::load_sequence(&sequence_path)?;
    let scheduler = FrameScheduler::new(&sequence, fps)?;

    println!("Sequence: {}", sequence.name());
    println!("  FPS: {}", scheduler.fps());
    println!("  Total duration: {:.3}s", scheduler.total_duration());
    println!("  Total frames: {}", scheduler.total_frames());
    println!();
    println!(
        "  {:<4} {:<20} {:>8} {:>10} {:>10} {:>10}",
        "#", "clip", "speed", "start", "end", "natural"
    );

    let clips = sequence.clips();
    for segment in scheduler.segments() {
        let clip = &clips[segment.clip_index];
        println!(
            "  {:<4} {:<20} {:>8.2} {:>10.3} {:>10.3} {:>10.3}",
            segment.clip_index,
            clip.id,
            clip.effects.speed,
            segment.start_secs,
            segment.end_secs(),
            clip.duration_secs,
        );
    }

    if frames > 0 {
        println!();
        println!("  {:<8} {:>10} {:<20} {:>10}", "frame", "global", "clip", "local");
        for slot in scheduler.slots().take(frames as usize) {
            println!(
                "  {:<8} {:>10.3} {:<20} {:>10.3}",
                slot.index, slot.global_time, clips[slot.clip_index].id, slot.local_time
            );
        }
    }

    Ok(())
}
