//! Reader for an extracted directory tree of `*/X/Y.png` files.

use super::{record_from_entry, ArchiveError, ArchiveReader, TileRecord};
use std::fs;
use std::path::Path;
use tracing::warn;

/// Depth-first walk over a directory tree.
#[derive(Debug)]
pub struct FolderReader {
    stack: Vec<fs::ReadDir>,
}

impl FolderReader {
    pub fn open(root: &Path) -> Result<Self, ArchiveError> {
        Ok(Self {
            stack: vec![fs::read_dir(root)?],
        })
    }
}

impl ArchiveReader for FolderReader {
    fn next_good(&mut self) -> Option<TileRecord> {
        while let Some(dir) = self.stack.last_mut() {
            let entry = match dir.next() {
                None => {
                    self.stack.pop();
                    continue;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
                Some(Ok(entry)) => entry,
            };

            let path = entry.path();
            if path.is_dir() {
                match fs::read_dir(&path) {
                    Ok(sub) => self.stack.push(sub),
                    Err(e) => warn!(path = %path.display(), error = %e, "skipping directory"),
                }
                continue;
            }

            match read_record(&path) {
                Ok(record) => return Some(record),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping bad file"),
            }
        }
        None
    }
}

fn read_record(path: &Path) -> Result<TileRecord, ArchiveError> {
    let name = path.to_string_lossy();
    let data = fs::read(path)?;
    let crc32 = crc32fast::hash(&data);
    record_from_entry(&name, data, crc32)
}
