//! Validate a sequence file.

use std::path::PathBuf;

pub fn run(sequence_path: PathBuf) -> anyhow::Result<()> {
    println!("Validating sequence at: {}", sequence_path.display());

    let sequence = super::load_sequence(&sequence_path)?;

    println!("  Name: {}", sequence.name());
    println!("  Clips: {}", sequence.len());
    println!("  Duration: {:.3}s", sequence.total_duration());
    for clip in sequence.clips() {
        let effects = &clip.effects;
        println!(
            "    - {} ({:.2}s x{:.2}, blur {:.1}, {} region(s))",
            clip.id,
            clip.duration_secs,
            effects.speed,
            effects.blur_radius,
            effects.selective_blur_regions.len()
        );
    }

    let errors = sequence.missing_sources();
    if errors.is_empty() {
        println!("  Sources: All present");
        println!("\nSequence is valid.");
    } else {
        println!("\nValidation issues:");
        for error in &errors {
            println!("  - {error}");
        }
        println!(
            "\n{} issue(s) found. Export will fail until sources are available.",
            errors.len()
        );
    }

    Ok(())
}
