//! Counters for the pyramid merge worker pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Outcome of one parent-tile merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStatus {
    Merged,
    Skipped,
    Empty,
}

#[derive(Debug, Default)]
pub struct MergeMetrics {
    merged: AtomicU64,
    skipped: AtomicU64,
    empty: AtomicU64,
    failed: AtomicU64,
    last_merged: AtomicU64,
    last_tile: Mutex<String>,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSnapshot {
    pub merged: u64,
    pub skipped: u64,
    pub empty: u64,
    pub failed: u64,
}

impl MergeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, status: MergeStatus, z: i32, x: i32, y: i32) {
        *self.last_tile.lock().unwrap() = format!("{z}/{x}/{y}");
        match status {
            MergeStatus::Merged => self.merged.fetch_add(1, Ordering::Relaxed),
            MergeStatus::Skipped => self.skipped.fetch_add(1, Ordering::Relaxed),
            MergeStatus::Empty => self.empty.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_failure(&self, z: i32, x: i32, y: i32) {
        *self.last_tile.lock().unwrap() = format!("{z}/{x}/{y}");
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MergeSnapshot {
        MergeSnapshot {
            merged: self.merged.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            empty: self.empty.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Emits one progress line with the merge rate since the last call.
    pub fn report(&self, interval_secs: f64) {
        let snapshot = self.snapshot();
        let last = self.last_merged.swap(snapshot.merged, Ordering::Relaxed);
        let rate = (snapshot.merged - last) as f64 / interval_secs;
        let last_tile = self.last_tile.lock().unwrap().clone();
        tracing::info!(
            rate = format_args!("{rate:.2}/s"),
            merged = snapshot.merged,
            skipped = snapshot.skipped,
            empty = snapshot.empty,
            failed = snapshot.failed,
            last_tile = %last_tile,
            "merge progress"
        );
    }
}
