pub mod check;
pub mod export;
pub mod plan;
pub mod validate;

use std::path::Path;

use clipweave_sequence_model::sequence::Sequence;

/// Load a sequence file, resolving relative clip paths against its directory.
pub fn load_sequence(path: &Path) -> anyhow::Result<Sequence> {
    let sequence =
        Sequence::load(path).map_err(|e| anyhow::anyhow!("Failed to load sequence: {e}"))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(sequence.with_sources_relative_to(base))
}
