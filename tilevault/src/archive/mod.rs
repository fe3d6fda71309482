//! Archive readers: stream `(z, x, y, bytes, crc32)` records out of a
//! release bundle.
//!
//! Three sources are supported, all behind [`ArchiveReader`]:
//! a (possibly multi-part) gzip-compressed tar stream, a 7z archive and
//! a plain directory tree. Entries follow the `*/X/Y.png` convention;
//! malformed entries are skipped, a non-continuable stream error ends
//! iteration.

mod folder;
mod seven_zip;
mod tar_gz;

pub use folder::FolderReader;
pub use seven_zip::SevenZipReader;
pub use tar_gz::TarGzReader;

use crate::coord::BASE_ZOOM;
use std::path::Path;
use thiserror::Error;

/// One leaf tile pulled out of an archive.
///
/// `crc32` is the IEEE CRC-32 of the source bytes as found in the
/// archive; it is the change-detection key downstream.
#[derive(Debug, Clone)]
pub struct TileRecord {
    pub z: i32,
    pub x: i32,
    pub y: i32,
    pub data: Vec<u8>,
    pub crc32: u32,
}

/// Errors from archive readers.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("unsupported input format: {0}")]
    UnsupportedFormat(String),

    #[error("no archive parts found")]
    NoParts,

    #[error("unexpected file path structure: {0}")]
    BadPath(String),

    #[error("failed to parse coordinate from path: {0}")]
    BadCoordinate(String),

    #[error("file {name} too large: {size} bytes")]
    EntryTooLarge { name: String, size: u64 },

    #[error("unknown entry type in {0}")]
    UnknownEntryType(String),

    #[error("7z archive error: {0}")]
    SevenZip(String),
}

/// A pull iterator over the good records of an archive.
///
/// `next_good` skips malformed entries and keeps iterating; `None`
/// means the archive is exhausted or hit a non-continuable error.
pub trait ArchiveReader: Send + std::fmt::Debug {
    fn next_good(&mut self) -> Option<TileRecord>;
}

/// Opens the reader matching the input's shape.
///
/// `.7z` files, directories, and `.tar.gz`/`.tgz` files are accepted.
pub fn open_archive(path: &Path) -> Result<Box<dyn ArchiveReader>, ArchiveError> {
    let name = path.to_string_lossy();
    if name.ends_with(".7z") {
        Ok(Box::new(SevenZipReader::open(path)?))
    } else if path.is_dir() {
        Ok(Box::new(FolderReader::open(path)?))
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Ok(Box::new(TarGzReader::open(path)?))
    } else {
        Err(ArchiveError::UnsupportedFormat(name.into_owned()))
    }
}

/// Parses the `X/Y.png` tail of an entry path into coordinates at the
/// base zoom.
pub(crate) fn parse_xy(entry_path: &str) -> Result<(i32, i32), ArchiveError> {
    let mut parts = entry_path.split('/').rev().filter(|p| !p.is_empty());
    let file = parts
        .next()
        .ok_or_else(|| ArchiveError::BadPath(entry_path.to_string()))?;
    let dir = parts
        .next()
        .ok_or_else(|| ArchiveError::BadPath(entry_path.to_string()))?;

    let x: i32 = dir
        .parse()
        .map_err(|_| ArchiveError::BadCoordinate(entry_path.to_string()))?;
    let y: i32 = file
        .strip_suffix(".png")
        .unwrap_or(file)
        .parse()
        .map_err(|_| ArchiveError::BadCoordinate(entry_path.to_string()))?;
    if x < 0 || y < 0 {
        return Err(ArchiveError::BadPath(entry_path.to_string()));
    }
    Ok((x, y))
}

/// Builds a record from an entry's path and content bytes.
pub(crate) fn record_from_entry(
    entry_path: &str,
    data: Vec<u8>,
    crc32: u32,
) -> Result<TileRecord, ArchiveError> {
    let (x, y) = parse_xy(entry_path)?;
    Ok(TileRecord {
        z: BASE_ZOOM,
        x,
        y,
        data,
        crc32,
    })
}
