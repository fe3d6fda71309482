//! Reader for (multi-part) gzip-compressed tar archives.
//!
//! Release bundles are published as a tar.gz split into parts
//! (`.tar.gz.aa`, `.tar.gz.ab`, ...). Parts are sorted by name and their
//! byte streams chained into one continuous gzip stream before the tar
//! walk. The walk runs on a background thread feeding a bounded channel,
//! so `next_good` stays a simple pull call.

use super::{record_from_entry, ArchiveError, ArchiveReader, TileRecord};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread;
use tracing::{error, warn};

/// Entries larger than this are rejected as malformed.
const MAX_ENTRY_SIZE: u64 = 10 * 1024 * 1024;

/// Internal stream buffer between the tar walker and the consumer.
const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug)]
pub struct TarGzReader {
    rx: Receiver<TileRecord>,
}

impl TarGzReader {
    /// Opens a single archive file.
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        Self::open_parts(vec![path.to_path_buf()])
    }

    /// Opens a split archive: parts are sorted by name and concatenated.
    pub fn open_parts(mut parts: Vec<PathBuf>) -> Result<Self, ArchiveError> {
        if parts.is_empty() {
            return Err(ArchiveError::NoParts);
        }
        parts.sort();

        let mut files = Vec::with_capacity(parts.len());
        for part in &parts {
            files.push(File::open(part)?);
        }

        let (tx, rx) = sync_channel(CHANNEL_CAPACITY);
        thread::Builder::new()
            .name("targz-reader".into())
            .spawn(move || walk_archive(files, tx))?;
        Ok(Self { rx })
    }
}

impl ArchiveReader for TarGzReader {
    fn next_good(&mut self) -> Option<TileRecord> {
        self.rx.recv().ok()
    }
}

fn walk_archive(files: Vec<File>, tx: SyncSender<TileRecord>) {
    let chained = files
        .into_iter()
        .map(|f| Box::new(f) as Box<dyn Read + Send>)
        .reduce(|a, b| Box::new(a.chain(b)))
        .expect("at least one part");
    let decoder = MultiGzDecoder::new(BufReader::new(chained));
    let mut archive = tar::Archive::new(decoder);

    let entries = match archive.entries() {
        Ok(entries) => entries,
        Err(e) => {
            error!(error = %e, "failed to open tar stream");
            return;
        }
    };

    for entry in entries {
        let mut entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                // Stream-level failure, cannot resync a tar stream
                error!(error = %e, "tar stream error, stopping");
                return;
            }
        };
        match read_entry(&mut entry) {
            Ok(Some(record)) => {
                if tx.send(record).is_err() {
                    // Consumer is gone
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "skipping bad archive entry"),
        }
    }
}

fn read_entry<R: Read>(entry: &mut tar::Entry<'_, R>) -> Result<Option<TileRecord>, ArchiveError> {
    let name = entry.path()?.to_string_lossy().into_owned();
    match entry.header().entry_type() {
        tar::EntryType::Directory | tar::EntryType::Symlink => return Ok(None),
        tar::EntryType::Regular => {}
        _ => return Err(ArchiveError::UnknownEntryType(name)),
    }

    let size = entry.header().size()?;
    if size > MAX_ENTRY_SIZE {
        return Err(ArchiveError::EntryTooLarge { name, size });
    }

    let mut data = Vec::with_capacity(size as usize);
    entry.read_to_end(&mut data)?;
    let crc32 = crc32fast::hash(&data);
    record_from_entry(&name, data, crc32).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn build_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        let tar_bytes = builder.into_inner().unwrap();

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        encoder.finish().unwrap()
    }

    fn write_parts(dir: &Path, bytes: &[u8], parts: usize) -> Vec<PathBuf> {
        let chunk = bytes.len().div_ceil(parts);
        let mut paths = Vec::new();
        for (i, piece) in bytes.chunks(chunk).enumerate() {
            let path = dir.join(format!("world.tar.gz.a{}", (b'a' + i as u8) as char));
            std::fs::write(&path, piece).unwrap();
            paths.push(path);
        }
        paths
    }

    #[test]
    fn test_reads_records_from_single_archive() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = build_archive(&[("tiles/3/4.png", b"aaa"), ("tiles/5/6.png", b"bbb")]);
        let path = dir.path().join("world.tar.gz");
        std::fs::write(&path, &bytes).unwrap();

        let mut reader = TarGzReader::open(&path).unwrap();
        let first = reader.next_good().unwrap();
        assert_eq!((first.x, first.y), (3, 4));
        assert_eq!(first.crc32, crc32fast::hash(b"aaa"));
        let second = reader.next_good().unwrap();
        assert_eq!((second.x, second.y), (5, 6));
        assert!(reader.next_good().is_none());
    }

    #[test]
    fn test_split_parts_are_reassembled_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = build_archive(&[("w/1/2.png", b"payload")]);
        let mut parts = write_parts(dir.path(), &bytes, 3);
        // Shuffle: the reader must sort back by name
        parts.reverse();

        let mut reader = TarGzReader::open_parts(parts).unwrap();
        let record = reader.next_good().unwrap();
        assert_eq!((record.x, record.y), (1, 2));
        assert_eq!(record.data, b"payload");
        assert!(reader.next_good().is_none());
    }

    #[test]
    fn test_bad_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = build_archive(&[
            ("not-a-tile.txt", b"junk"),
            ("w/9/9.png", b"good"),
            ("w/x/y.png", b"junk"),
        ]);
        let path = dir.path().join("world.tgz");
        std::fs::write(&path, &bytes).unwrap();

        let mut reader = TarGzReader::open(&path).unwrap();
        let record = reader.next_good().unwrap();
        assert_eq!((record.x, record.y), (9, 9));
        assert!(reader.next_good().is_none());
    }

    #[test]
    fn test_missing_file_is_an_open_error() {
        assert!(TarGzReader::open(Path::new("/nonexistent/world.tar.gz")).is_err());
    }

    #[test]
    fn test_empty_part_list_rejected() {
        assert!(matches!(
            TarGzReader::open_parts(Vec::new()),
            Err(ArchiveError::NoParts)
        ));
    }
}
