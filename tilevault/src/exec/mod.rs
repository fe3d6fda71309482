//! Plan executor: download, ingest, merge, install.
//!
//! Jobs run strictly in plan order so a promoted base exists before the
//! diffs that reference it. The finished store is switched back to the
//! rollback journal and then moved into the done directory; the move is
//! crash-safe (rename, with copy-then-remove as the cross-filesystem
//! fallback), so a processed file either exists completely or not at
//! all.

use crate::ingest::{self, IngestError};
use crate::plan::PlanJob;
use crate::pyramid::{self, MergeError};
use crate::release::{Release, ReleaseAsset};
use crate::store::{StoreError, TileStore};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

const INGEST_WORKERS: usize = 10;
const MERGE_WORKERS: usize = 10;
const MERGE_INITIAL_ZOOM: i32 = 10;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("download failed: {0}")]
    Http(String),

    #[error("no tar.gz parts found in release {0}")]
    NoParts(String),

    #[error("ingest archive: {0}")]
    Ingest(#[from] IngestError),

    #[error("merge tiles: {0}")]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Downloads all archive parts of a release and concatenates them, in
/// name order, into a single tar.gz in `work_dir`.
pub fn download_release(
    client: &reqwest::blocking::Client,
    release: &Release,
    work_dir: &Path,
) -> Result<PathBuf, ExecError> {
    let parts = select_parts(&release.assets)
        .ok_or_else(|| ExecError::NoParts(release.name.clone()))?;

    let out_path = work_dir.join(archive_name(&parts[0].name));
    fs::create_dir_all(work_dir)?;
    let mut out = fs::File::create(&out_path)?;

    for part in parts {
        info!(url = %part.download_url, out = %out_path.display(), "downloading part");
        let mut response = client
            .get(&part.download_url)
            .send()
            .map_err(|e| ExecError::Http(format!("{}: {e}", part.download_url)))?;
        if !response.status().is_success() {
            return Err(ExecError::Http(format!(
                "{}: bad status {}",
                part.download_url,
                response.status()
            )));
        }
        response
            .copy_to(&mut out)
            .map_err(|e| ExecError::Http(format!("{}: {e}", part.download_url)))?;
    }

    Ok(out_path)
}

/// Picks the `.tar.gz` assets (whole archives and split parts alike),
/// sorted by name so split parts concatenate in order.
fn select_parts(assets: &[ReleaseAsset]) -> Option<Vec<&ReleaseAsset>> {
    let mut parts: Vec<&ReleaseAsset> = assets
        .iter()
        .filter(|a| a.name.contains(".tar.gz"))
        .collect();
    if parts.is_empty() {
        return None;
    }
    parts.sort_by(|a, b| a.name.cmp(&b.name));
    Some(parts)
}

/// Derives the reassembled archive name from the first part, trimming
/// the split suffix: `world.tar.gz.aa` -> `world.tar.gz`.
fn archive_name(first_part: &str) -> String {
    match first_part.find(".tar.gz") {
        Some(at) => first_part[..at + ".tar.gz".len()].to_string(),
        None => first_part.to_string(),
    }
}

/// Moves a file, falling back to copy-then-remove when rename fails
/// (e.g. across filesystems).
pub fn move_file(src: &Path, dst: &Path) -> std::io::Result<()> {
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    fs::copy(src, dst)?;
    fs::remove_file(src)
}

/// Runs the full pipeline for every job, in order.
///
/// `tmp_dir` overrides where archive parts are downloaded (useful for a
/// RAM disk); the default lives under the work directory.
pub fn exec_plan(
    jobs: &[PlanJob],
    work_dir: &Path,
    done_dir: &Path,
    tmp_dir: Option<&Path>,
) -> Result<(), ExecError> {
    let processed_dir = work_dir.join("processed");
    let archives_dir = tmp_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| work_dir.join("archives"));
    fs::create_dir_all(&processed_dir)?;
    fs::create_dir_all(&archives_dir)?;

    // No application-level timeout: multi-GB parts can take a while
    let client = reqwest::blocking::Client::builder()
        .timeout(Option::<std::time::Duration>::None)
        .user_agent(concat!("tilevault/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ExecError::Http(format!("failed to create HTTP client: {e}")))?;

    for job in jobs {
        let start = Instant::now();
        info!(release = %job.release.name, file = %job.processed_file, "processing archive");

        let assets_dir = archives_dir.join(job.release.id.to_string());
        let archive = download_release(&client, &job.release, &assets_dir)?;

        let base = if job.is_diff {
            Some(done_dir.join(&job.base))
        } else {
            None
        };
        let out = processed_dir.join(&job.processed_file);

        process_archive(&archive, &out, base.as_deref(), done_dir, &job.processed_file)?;

        if let Err(e) = fs::remove_dir_all(&assets_dir) {
            warn!(dir = %assets_dir.display(), error = %e, "failed to clean up archive parts");
        }
        info!(
            release = %job.release.name,
            elapsed = ?start.elapsed(),
            "done processing archive"
        );
    }
    Ok(())
}

/// Ingests and merges one downloaded archive, then atomically installs
/// the finished store into the done directory.
pub fn process_archive(
    archive: &Path,
    out: &Path,
    base: Option<&Path>,
    done_dir: &Path,
    processed_file: &str,
) -> Result<(), ExecError> {
    ingest::ingest_archive(archive, out, base, INGEST_WORKERS)?;
    pyramid::merge_store(out, base, MERGE_WORKERS, MERGE_INITIAL_ZOOM)?;

    // The moved file must carry no WAL sidecars
    TileStore::switch_to_rollback(out)?;
    move_file(out, &done_dir.join(processed_file))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(name: &str) -> ReleaseAsset {
        ReleaseAsset {
            name: name.to_string(),
            download_url: format!("https://example.com/{name}"),
        }
    }

    #[test]
    fn test_select_parts_sorts_and_filters() {
        let assets = vec![
            asset("world.tar.gz.ab"),
            asset("checksums.txt"),
            asset("world.tar.gz.aa"),
            asset("world.tar.gz.ac"),
        ];
        let parts = select_parts(&assets).unwrap();
        let names: Vec<_> = parts.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["world.tar.gz.aa", "world.tar.gz.ab", "world.tar.gz.ac"]
        );
    }

    #[test]
    fn test_select_parts_accepts_whole_archive() {
        let assets = vec![asset("world.tar.gz")];
        assert_eq!(select_parts(&assets).unwrap().len(), 1);
    }

    #[test]
    fn test_select_parts_empty_when_no_archives() {
        assert!(select_parts(&[asset("readme.md")]).is_none());
    }

    #[test]
    fn test_archive_name_trims_split_suffix() {
        assert_eq!(archive_name("world.tar.gz.aa"), "world.tar.gz");
        assert_eq!(archive_name("world.tar.gz"), "world.tar.gz");
    }

    #[test]
    fn test_move_file_same_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.db");
        let dst = dir.path().join("done").join("dst.db");
        fs::create_dir_all(dst.parent().unwrap()).unwrap();
        fs::write(&src, b"store bytes").unwrap();

        move_file(&src, &dst).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&dst).unwrap(), b"store bytes");
    }
}
