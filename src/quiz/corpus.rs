//! Question corpus file (JSON array of entries)

use crate::error::Result;
use crate::types::CorpusEntry;
use std::path::Path;
use tracing::info;

/// Read a corpus file
pub fn read_corpus<P: AsRef<Path>>(path: P) -> Result<Vec<CorpusEntry>> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    let entries: Vec<CorpusEntry> = serde_json::from_str(&raw)?;
    info!(
        "Read {} corpus entries from {}",
        entries.len(),
        path.as_ref().display()
    );
    Ok(entries)
}

/// Write entries as a pretty-printed corpus file
pub fn write_corpus<P: AsRef<Path>>(path: P, entries: &[CorpusEntry]) -> Result<()> {
    let json = serde_json::to_string_pretty(entries)?;
    std::fs::write(path.as_ref(), json)?;
    info!(
        "Wrote {} corpus entries to {}",
        entries.len(),
        path.as_ref().display()
    );
    Ok(())
}
