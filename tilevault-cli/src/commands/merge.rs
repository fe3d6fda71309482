//! `tilevault merge` - build the zoom pyramid inside a store.

use crate::error::CliError;
use std::path::Path;
use std::time::Instant;
use tilevault::pyramid::merge_store;
use tracing::info;

pub fn run(
    target: &Path,
    base: Option<&Path>,
    workers: usize,
    initial_zoom: i32,
) -> Result<(), CliError> {
    let start = Instant::now();
    merge_store(target, base, workers, initial_zoom)?;
    info!(elapsed = ?start.elapsed(), "Done");
    Ok(())
}
