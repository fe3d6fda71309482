//! Lock-free counters for the ingest worker pool.
//!
//! All operations use `Relaxed` ordering: the counters are independent
//! measurements and the reporter only needs eventually-consistent reads.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counter set for one ingest run.
///
/// `done = success + skip + fail`; `crc_skip` additionally counts the
/// skips decided from the base store's CRC alone.
#[derive(Debug, Default)]
pub struct IngestMetrics {
    read: AtomicU64,
    done: AtomicU64,
    success: AtomicU64,
    skip: AtomicU64,
    fail: AtomicU64,
    crc_skip: AtomicU64,
    last_read: AtomicU64,
    last_done: AtomicU64,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSnapshot {
    pub read: u64,
    pub done: u64,
    pub success: u64,
    pub skip: u64,
    pub fail: u64,
    pub crc_skip: u64,
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_read(&self) {
        self.read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn success(&self) {
        self.done.fetch_add(1, Ordering::Relaxed);
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn skip(&self) {
        self.done.fetch_add(1, Ordering::Relaxed);
        self.skip.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fail(&self) {
        self.done.fetch_add(1, Ordering::Relaxed);
        self.fail.fetch_add(1, Ordering::Relaxed);
    }

    pub fn crc_skip(&self) {
        self.crc_skip.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestSnapshot {
        IngestSnapshot {
            read: self.read.load(Ordering::Relaxed),
            done: self.done.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            skip: self.skip.load(Ordering::Relaxed),
            fail: self.fail.load(Ordering::Relaxed),
            crc_skip: self.crc_skip.load(Ordering::Relaxed),
        }
    }

    /// Emits one progress line with rates computed from the deltas since
    /// the previous report.
    pub fn report(&self, interval_secs: f64) {
        let snapshot = self.snapshot();
        let last_done = self.last_done.swap(snapshot.done, Ordering::Relaxed);
        let last_read = self.last_read.swap(snapshot.read, Ordering::Relaxed);
        let rate = (snapshot.done - last_done) as f64 / interval_secs;
        let read_rate = (snapshot.read - last_read) as f64 / interval_secs;
        tracing::info!(
            rate = format_args!("{rate:.2}/s"),
            done = snapshot.done,
            success = snapshot.success,
            skip = snapshot.skip,
            fail = snapshot.fail,
            read_rate = format_args!("{read_rate:.2}/s"),
            read = snapshot.read,
            crc_skip = snapshot.crc_skip,
            "ingest progress"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_done_aggregates_outcomes() {
        let metrics = IngestMetrics::new();
        metrics.record_read();
        metrics.record_read();
        metrics.success();
        metrics.skip();
        metrics.fail();
        metrics.crc_skip();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.read, 2);
        assert_eq!(snapshot.done, 3);
        assert_eq!(snapshot.success, 1);
        assert_eq!(snapshot.skip, 1);
        assert_eq!(snapshot.fail, 1);
        assert_eq!(snapshot.crc_skip, 1);
    }
}
