//! Ingest worker pool: archive reader -> palette codec -> tile store.
//!
//! A single producer drains the archive reader into a bounded queue;
//! worker threads recolour each tile, optionally diff it against a base
//! store, and upsert it. Per-tile failures are counted, never fatal;
//! there is no ordering guarantee between tiles.

mod metrics;

pub use metrics::{IngestMetrics, IngestSnapshot};

use crate::archive::{open_archive, ArchiveError, ArchiveReader, TileRecord};
use crate::palette::{diff, PaletteError, Paletter};
use crate::store::{StoreError, TileStore};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Queue capacity between the reader and the workers; producers block on
/// a full queue, backpressuring against slow disk writes.
const QUEUE_CAPACITY: usize = 200;

/// Progress report cadence.
const REPORT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Palette(#[from] PaletteError),
}

/// Tuning knobs for one ingest run.
#[derive(Debug, Clone, Copy)]
pub struct IngestConfig {
    pub workers: usize,
    pub force: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            force: false,
        }
    }
}

enum Outcome {
    Written,
    Skipped,
}

/// Drives an archive reader into a writable tile store.
pub struct Ingester {
    store: Arc<TileStore>,
    base: Option<Arc<TileStore>>,
    config: IngestConfig,
    paletter: Paletter,
    metrics: Arc<IngestMetrics>,
}

impl Ingester {
    pub fn new(store: Arc<TileStore>, config: IngestConfig) -> Self {
        Self {
            store,
            base: None,
            config,
            paletter: Paletter::new(),
            metrics: Arc::new(IngestMetrics::new()),
        }
    }

    /// An ingester that stores tiles as diffs against `base`.
    pub fn with_base(store: Arc<TileStore>, base: Arc<TileStore>, config: IngestConfig) -> Self {
        let mut ingester = Self::new(store, config);
        ingester.base = Some(base);
        ingester
    }

    pub fn metrics(&self) -> Arc<IngestMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Runs the pool to completion and returns the final counters.
    pub fn run(&self, mut reader: Box<dyn ArchiveReader>) -> IngestSnapshot {
        let (tx, rx) = sync_channel::<TileRecord>(QUEUE_CAPACITY);
        let rx = Mutex::new(rx);
        let stop = AtomicBool::new(false);

        thread::scope(|scope| {
            let workers: Vec<_> = (0..self.config.workers.max(1))
                .map(|_| scope.spawn(|| self.worker(&rx)))
                .collect();
            scope.spawn(|| report_loop(&self.metrics, &stop));

            while let Some(record) = reader.next_good() {
                if tx.send(record).is_err() {
                    break;
                }
                self.metrics.record_read();
            }
            drop(tx);

            for worker in workers {
                let _ = worker.join();
            }
            stop.store(true, Ordering::Relaxed);
        });

        self.metrics.snapshot()
    }

    fn worker(&self, rx: &Mutex<Receiver<TileRecord>>) {
        loop {
            let record = {
                let guard = rx.lock().unwrap();
                guard.recv()
            };
            let Ok(record) = record else {
                break;
            };
            match self.process(&record) {
                Ok(Outcome::Written) => self.metrics.success(),
                Ok(Outcome::Skipped) => self.metrics.skip(),
                Err(e) => {
                    warn!(
                        tile = %format_args!("{}/{}/{}", record.z, record.x, record.y),
                        crc32 = record.crc32,
                        error = %e,
                        "tile failed"
                    );
                    self.metrics.fail();
                }
            }
        }
    }

    fn process(&self, record: &TileRecord) -> Result<Outcome, IngestError> {
        let (z, x, y) = (record.z, record.x, record.y);

        if !self.config.force {
            // A stat failure is treated like presence: don't fight a
            // store we cannot even stat.
            match self.store.stat(z, x, y) {
                Ok((false, _)) => {}
                _ => return Ok(Outcome::Skipped),
            }
        }

        // Fast path: the base store already holds this exact source tile
        if let Some(base) = &self.base {
            if let Ok((true, base_crc)) = base.stat(z, x, y) {
                if base_crc == record.crc32 {
                    self.metrics.crc_skip();
                    return Ok(Outcome::Skipped);
                }
            }
        }

        let mut packed = self.paletter.pack(&record.data)?;

        if let Some(base) = &self.base {
            if let Ok(Some(base_data)) = base.get(z, x, y) {
                // A failed diff falls through and writes the full tile
                if let Ok((diff_bytes, changed)) =
                    diff::diff_png(&self.paletter, &base_data, &packed)
                {
                    if !changed {
                        return Ok(Outcome::Skipped);
                    }
                    packed = diff_bytes;
                }
            }
        }

        // Stored CRC is always the *source* CRC, not of the packed bytes
        self.store.put(z, x, y, &packed, record.crc32)?;
        Ok(Outcome::Written)
    }
}

fn report_loop(metrics: &IngestMetrics, stop: &AtomicBool) {
    let mut last = Instant::now();
    while !stop.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(250));
        if last.elapsed() >= REPORT_INTERVAL {
            metrics.report(last.elapsed().as_secs_f64());
            last = Instant::now();
        }
    }
}

/// Ingests one archive (7z, tar.gz or directory) into `out`, optionally
/// diffing against the done store at `base`.
pub fn ingest_archive(
    from: &Path,
    out: &Path,
    base: Option<&Path>,
    workers: usize,
) -> Result<IngestSnapshot, IngestError> {
    let store = Arc::new(TileStore::open(out, false)?);
    let reader = open_archive(from)?;
    let config = IngestConfig {
        workers,
        force: false,
    };

    info!(
        from = %from.display(),
        out = %out.display(),
        base = base.map(|b| b.display().to_string()),
        workers,
        "starting ingest"
    );

    let snapshot = match base {
        Some(base_path) => {
            let base_store = Arc::new(TileStore::open(base_path, true)?);
            Ingester::with_base(Arc::clone(&store), base_store, config).run(reader)
        }
        None => Ingester::new(Arc::clone(&store), config).run(reader),
    };

    if let Ok(store) = Arc::try_unwrap(store) {
        store.close();
    }
    info!(
        done = snapshot.done,
        success = snapshot.success,
        skip = snapshot.skip,
        fail = snapshot.fail,
        "ingest complete"
    );
    Ok(snapshot)
}
