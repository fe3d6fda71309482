//! Persistent SQLite tile store.
//!
//! One table `tiles(z, x, y, crc32, data)` keyed by `(z, x, y)`. A store
//! is opened in WAL mode while writable and reverted to the rollback
//! journal on close, so a finished store file has no sidecar
//! dependencies. A single handle is shared by all workers; SQLite's busy
//! timeout plus a bounded retry loop absorb write contention.

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// SQLite busy timeout.
const BUSY_TIMEOUT_MS: u64 = 20_000;

/// WAL journal size limit: 500 MiB.
const JOURNAL_SIZE_LIMIT: u64 = 524_288_000;

/// Write retry policy.
const PUT_RETRIES: u32 = 5;
const PUT_BACKOFF: Duration = Duration::from_millis(300);

/// Errors from the tile store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to write tile {z}/{x}/{y} after {attempts} attempts")]
    PutExhausted { z: i32, x: i32, y: i32, attempts: u32 },
}

/// A keyed store of `(z, x, y) -> (crc32, png bytes)`.
pub struct TileStore {
    conn: Mutex<Connection>,
    path: PathBuf,
    read_only: bool,
}

impl TileStore {
    /// Opens (and for writable stores, creates) a tile store.
    pub fn open(path: &Path, read_only: bool) -> Result<Self, StoreError> {
        let mut flags = OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_SHARED_CACHE;
        if read_only {
            flags |= OpenFlags::SQLITE_OPEN_READ_ONLY;
        } else {
            flags |= OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        }
        let conn = Connection::open_with_flags(path, flags)?;

        conn.execute_batch(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS};"))?;
        if !read_only {
            conn.execute_batch(&format!(
                "PRAGMA journal_mode = WAL;\n\
                 PRAGMA journal_size_limit = {JOURNAL_SIZE_LIMIT};"
            ))?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS tiles (
                    z INTEGER NOT NULL,
                    x INTEGER NOT NULL,
                    y INTEGER NOT NULL,
                    crc32 INTEGER,
                    data BLOB NOT NULL,
                    PRIMARY KEY (z, x, y)
                );",
            )?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
            read_only,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Upserts a tile, retrying on write contention.
    pub fn put(&self, z: i32, x: i32, y: i32, data: &[u8], crc32: u32) -> Result<(), StoreError> {
        for attempt in 1..=PUT_RETRIES {
            let result = {
                let conn = self.conn.lock().unwrap();
                conn.prepare_cached(
                    "INSERT INTO tiles (z, x, y, crc32, data) VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(z, x, y) DO UPDATE SET data = excluded.data, crc32 = excluded.crc32",
                )
                .and_then(|mut stmt| stmt.execute(params![z, x, y, crc32 as i64, data]))
            };
            match result {
                Ok(_) => return Ok(()),
                Err(e) => {
                    warn!(
                        tile = %format_args!("{z}/{x}/{y}"),
                        attempt,
                        retries = PUT_RETRIES,
                        error = %e,
                        "tile write failed"
                    );
                    thread::sleep(PUT_BACKOFF);
                }
            }
        }
        Err(StoreError::PutExhausted {
            z,
            x,
            y,
            attempts: PUT_RETRIES,
        })
    }

    /// Upserts a tile, deriving the CRC from the stored bytes.
    ///
    /// Used for derived (merged) tiles which have no source CRC.
    pub fn put_auto_crc(&self, z: i32, x: i32, y: i32, data: &[u8]) -> Result<(), StoreError> {
        let crc32 = crc32fast::hash(data);
        self.put(z, x, y, data, crc32)
    }

    /// Fetches a tile's bytes; `None` when absent.
    pub fn get(&self, z: i32, x: i32, y: i32) -> Result<Option<Vec<u8>>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare_cached("SELECT data FROM tiles WHERE z = ?1 AND x = ?2 AND y = ?3")?;
        Ok(stmt
            .query_row(params![z, x, y], |row| row.get::<_, Vec<u8>>(0))
            .optional()?)
    }

    /// Reports whether a tile exists and its stored CRC.
    ///
    /// A missing tile is `(false, 0)`, not an error.
    pub fn stat(&self, z: i32, x: i32, y: i32) -> Result<(bool, u32), StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare_cached("SELECT crc32 FROM tiles WHERE z = ?1 AND x = ?2 AND y = ?3")?;
        let crc = stmt
            .query_row(params![z, x, y], |row| row.get::<_, i64>(0))
            .optional()?;
        Ok(match crc {
            Some(crc) => (true, crc as u32),
            None => (false, 0),
        })
    }

    /// Lists all `(x, y)` present at a zoom level.
    ///
    /// Worst case at the deepest zoom this is 4^11 pairs, which is an
    /// acceptable in-memory set.
    pub fn list(&self, z: i32) -> Result<Vec<(u32, u32)>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT x, y FROM tiles WHERE z = ?1")?;
        let rows = stmt.query_map(params![z], |row| {
            Ok((row.get::<_, i64>(0)? as u32, row.get::<_, i64>(1)? as u32))
        })?;
        let mut tiles = Vec::new();
        for row in rows {
            tiles.push(row?);
        }
        Ok(tiles)
    }

    /// Closes the store, reverting a writable store to the rollback
    /// journal so the file can be shipped without its WAL sidecars.
    pub fn close(self) {
        let conn = self.conn.into_inner().unwrap();
        if !self.read_only {
            if let Err(e) = conn.execute_batch("PRAGMA journal_mode = DELETE;") {
                warn!(path = %self.path.display(), error = %e, "failed to revert journal mode");
            }
        }
    }

    /// Forces an on-disk store back to the rollback journal.
    ///
    /// The executor runs this before installing a store into the done
    /// directory.
    pub fn switch_to_rollback(path: &Path) -> Result<(), StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = DELETE;")?;
        Ok(())
    }
}
