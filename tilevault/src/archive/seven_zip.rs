//! Reader for 7z archives.
//!
//! Entries are enumerated in archive order on a background thread; the
//! per-entry CRC comes from the archive metadata rather than being
//! recomputed from the bytes.

use super::{record_from_entry, ArchiveError, ArchiveReader, TileRecord};
use sevenz_rust::{Password, SevenZReader};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread;
use tracing::{error, warn};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug)]
pub struct SevenZipReader {
    rx: Receiver<TileRecord>,
}

impl SevenZipReader {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        // Surface missing/unreadable files at open time; the archive
        // itself is parsed on the reader thread.
        File::open(path)?;

        let path = path.to_path_buf();
        let (tx, rx) = sync_channel(CHANNEL_CAPACITY);
        thread::Builder::new()
            .name("sevenz-reader".into())
            .spawn(move || walk_archive(path, tx))?;
        Ok(Self { rx })
    }
}

impl ArchiveReader for SevenZipReader {
    fn next_good(&mut self) -> Option<TileRecord> {
        self.rx.recv().ok()
    }
}

fn walk_archive(path: PathBuf, tx: SyncSender<TileRecord>) {
    let mut archive = match SevenZReader::open(&path, Password::empty()) {
        Ok(archive) => archive,
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to open 7z archive");
            return;
        }
    };

    let result = archive.for_each_entries(|entry, reader| {
        if entry.is_directory() {
            return Ok(true);
        }
        let name = entry.name().to_string();
        let mut data = Vec::with_capacity(entry.size() as usize);
        if let Err(e) = reader.read_to_end(&mut data) {
            warn!(entry = %name, error = %e, "skipping unreadable 7z entry");
            return Ok(true);
        }
        match record_from_entry(&name, data, entry.crc as u32) {
            Ok(record) => {
                // Stop cleanly when the consumer is gone
                Ok(tx.send(record).is_ok())
            }
            Err(e) => {
                warn!(entry = %name, error = %e, "skipping bad 7z entry");
                Ok(true)
            }
        }
    });

    if let Err(e) = result {
        error!(path = %path.display(), error = %e, "7z read error, stopping");
    }
}
