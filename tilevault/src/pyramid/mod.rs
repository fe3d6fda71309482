//! Pyramid merger: builds zoom levels top-down by 2x2 reduction.
//!
//! For each zoom `z` from the initial level down to 0, every parent of a
//! tile present at `z + 1` is produced by merging its four children with
//! the majority-non-transparent rule. Descending only after a level is
//! complete preserves the invariant that all of `z + 1` exists when
//! `z` is merged. With a base store present, children are reconstructed
//! through `undiff` and the merged parent is itself stored as a diff.

mod metrics;

pub use metrics::{MergeMetrics, MergeSnapshot, MergeStatus};

use crate::coord::{BASE_ZOOM, TILE_SIZE};
use crate::palette::{diff, reduce, PaletteError, PalettedTile, Paletter};
use crate::store::{StoreError, TileStore};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Progress report cadence.
const REPORT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("invalid initial zoom level: {0}")]
    InvalidInitialZoom(i32),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Palette(#[from] PaletteError),
}

/// Tuning knobs for one merge run.
#[derive(Debug, Clone, Copy)]
pub struct MergeConfig {
    pub workers: usize,
    /// Deepest parent level to produce; children are read from
    /// `initial_zoom + 1`.
    pub initial_zoom: i32,
    pub force: bool,
    /// Side length of stored tiles; substitutes for missing children.
    pub tile_size: u32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            workers: 16,
            initial_zoom: 10,
            force: false,
            tile_size: TILE_SIZE,
        }
    }
}

/// Builds the zoom pyramid inside one tile store.
pub struct Merger {
    store: Arc<TileStore>,
    base: Option<Arc<TileStore>>,
    config: MergeConfig,
    paletter: Paletter,
    empty: PalettedTile,
    metrics: Arc<MergeMetrics>,
}

impl Merger {
    pub fn new(
        store: Arc<TileStore>,
        base: Option<Arc<TileStore>>,
        config: MergeConfig,
    ) -> Result<Self, MergeError> {
        if config.initial_zoom < 0 || config.initial_zoom >= BASE_ZOOM {
            return Err(MergeError::InvalidInitialZoom(config.initial_zoom));
        }
        Ok(Self {
            store,
            base,
            config,
            paletter: Paletter::new(),
            empty: PalettedTile::empty(config.tile_size, config.tile_size),
            metrics: Arc::new(MergeMetrics::new()),
        })
    }

    pub fn metrics(&self) -> Arc<MergeMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Walks all levels from the initial zoom down to 0.
    pub fn run(&self) -> Result<MergeSnapshot, MergeError> {
        let stop = AtomicBool::new(false);
        let result = thread::scope(|scope| {
            scope.spawn(|| report_loop(&self.metrics, &stop));
            let result = (0..=self.config.initial_zoom)
                .rev()
                .try_for_each(|z| self.merge_level(z));
            stop.store(true, Ordering::Relaxed);
            result
        });
        result?;
        Ok(self.metrics.snapshot())
    }

    /// Merges every parent of the tiles present at `z + 1`.
    fn merge_level(&self, z: i32) -> Result<(), MergeError> {
        let children = self.store.list(z + 1)?;

        let (tx, rx) = channel::<(i32, i32)>();
        let rx = Mutex::new(rx);
        let mut parents: HashSet<(u32, u32)> = HashSet::new();

        thread::scope(|scope| {
            for _ in 0..self.config.workers.max(1) {
                scope.spawn(|| self.worker(z, &rx));
            }

            for (cx, cy) in children {
                let parent = (cx / 2, cy / 2);
                if parents.insert(parent) && tx.send((parent.0 as i32, parent.1 as i32)).is_err() {
                    break;
                }
            }
            drop(tx);
        });

        info!(level = z, jobs = parents.len(), "level finished");
        Ok(())
    }

    fn worker(&self, z: i32, rx: &Mutex<Receiver<(i32, i32)>>) {
        loop {
            let job = {
                let guard = rx.lock().unwrap();
                guard.recv()
            };
            let Ok((x, y)) = job else {
                break;
            };
            match self.merge_tile(z, x, y) {
                Ok(status) => self.metrics.record(status, z, x, y),
                Err(e) => {
                    warn!(
                        tile = %format_args!("{z}/{x}/{y}"),
                        error = %e,
                        "failed to merge tile"
                    );
                    self.metrics.record_failure(z, x, y);
                }
            }
        }
    }

    /// Produces tile `(z, x, y)` from its four children at `z + 1`.
    pub fn merge_tile(&self, z: i32, x: i32, y: i32) -> Result<MergeStatus, MergeError> {
        if z >= BASE_ZOOM {
            return Ok(MergeStatus::Skipped);
        }
        let (exists, _) = self.store.stat(z, x, y)?;
        if exists && !self.config.force {
            return Ok(MergeStatus::Skipped);
        }

        let mut empty_count = 0;
        let mut children = Vec::with_capacity(4);
        for i in 0..4 {
            let (dx, dy) = (i % 2, i / 2);
            let (child, missing) = self.fetch_child(z + 1, x * 2 + dx, y * 2 + dy);
            if missing {
                empty_count += 1;
            }
            children.push(child);
        }
        if empty_count == 4 {
            return Ok(MergeStatus::Empty);
        }

        let mut merged =
            reduce::merge_quadrants(&children[0], &children[1], &children[2], &children[3])?;

        if let Some(base) = &self.base {
            if let Ok(Some(base_data)) = base.get(z, x, y) {
                if let Ok(base_tile) = self.paletter.decode_paletted(&base_data) {
                    if let Ok((diff_tile, changed)) = diff::diff(&base_tile, &merged) {
                        if !changed {
                            return Ok(MergeStatus::Empty);
                        }
                        merged = diff_tile;
                    }
                }
            }
        }

        let encoded = self.paletter.encode_png(&merged)?;
        // Derived tiles have no source CRC; the stored CRC covers the
        // encoded bytes instead.
        self.store.put_auto_crc(z, x, y, &encoded)?;
        Ok(MergeStatus::Merged)
    }

    /// Fetches one child, reconstructing it through the base when
    /// diffing. Any failure substitutes an all-transparent tile; this is
    /// the documented lossy path.
    fn fetch_child(&self, z: i32, x: i32, y: i32) -> (PalettedTile, bool) {
        let Ok(Some(data)) = self.store.get(z, x, y) else {
            return (self.empty.clone(), true);
        };
        let new_tile = match self.paletter.decode_paletted(&data) {
            Ok(tile) => tile,
            Err(e) => {
                warn!(tile = %format_args!("{z}/{x}/{y}"), error = %e, "failed to decode tile");
                return (self.empty.clone(), true);
            }
        };

        let Some(base) = &self.base else {
            return (new_tile, false);
        };
        let Ok(Some(base_data)) = base.get(z, x, y) else {
            return (self.empty.clone(), true);
        };
        let base_tile = match self.paletter.decode_paletted(&base_data) {
            Ok(tile) => tile,
            Err(e) => {
                warn!(tile = %format_args!("{z}/{x}/{y}"), error = %e, "failed to decode base tile");
                return (self.empty.clone(), true);
            }
        };
        match diff::undiff(&base_tile, &new_tile) {
            Ok(tile) => (tile, false),
            Err(e) => {
                warn!(tile = %format_args!("{z}/{x}/{y}"), error = %e, "failed to undiff tile");
                (self.empty.clone(), true)
            }
        }
    }
}

fn report_loop(metrics: &MergeMetrics, stop: &AtomicBool) {
    let mut last = Instant::now();
    while !stop.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(250));
        if last.elapsed() >= REPORT_INTERVAL {
            metrics.report(last.elapsed().as_secs_f64());
            last = Instant::now();
        }
    }
}

/// Builds the pyramid in `target`, optionally diffing each level against
/// the done store at `base`.
pub fn merge_store(
    target: &Path,
    base: Option<&Path>,
    workers: usize,
    initial_zoom: i32,
) -> Result<MergeSnapshot, MergeError> {
    let store = Arc::new(TileStore::open(target, false)?);
    let base_store = match base {
        Some(path) => Some(Arc::new(TileStore::open(path, true)?)),
        None => None,
    };

    info!(
        target = %target.display(),
        base = base.map(|b| b.display().to_string()),
        workers,
        initial_zoom,
        "starting merge"
    );

    let config = MergeConfig {
        workers,
        initial_zoom,
        ..Default::default()
    };
    let merger = Merger::new(Arc::clone(&store), base_store, config)?;
    let snapshot = merger.run()?;
    drop(merger);

    if let Ok(store) = Arc::try_unwrap(store) {
        store.close();
    }
    info!(
        merged = snapshot.merged,
        skipped = snapshot.skipped,
        empty = snapshot.empty,
        failed = snapshot.failed,
        "merge complete"
    );
    Ok(snapshot)
}
