//! `tilevault ingest` - one archive into one tile store.

use crate::error::CliError;
use std::path::Path;
use std::time::Instant;
use tilevault::ingest::ingest_archive;
use tracing::info;

pub fn run(
    from: &Path,
    out: &Path,
    base: Option<&Path>,
    workers: usize,
) -> Result<(), CliError> {
    let start = Instant::now();
    ingest_archive(from, out, base, workers)?;
    info!(elapsed = ?start.elapsed(), "Done");
    Ok(())
}
