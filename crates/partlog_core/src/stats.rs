//! Write-ahead log statistics.
//!
//! # Usage
//!
//! ```rust,ignore
//! let wal = WalManager::open(dir, WalConfig::default())?;
//! wal.append(&record)?;
//!
//! let stats = wal.stats().snapshot();
//! println!("appended: {} records", stats.records_appended);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing log activity.
///
/// All counters are atomic and can be read while the log is in use. They
/// only ever increase.
#[derive(Debug, Default)]
pub struct WalStats {
    // Write path
    records_appended: AtomicU64,
    bytes_appended: AtomicU64,
    flushes: AtomicU64,
    segments_created: AtomicU64,
    segments_removed: AtomicU64,

    // Read path
    replay_sessions: AtomicU64,
    records_replayed: AtomicU64,
    bytes_replayed: AtomicU64,
    /// Damaged tails accepted as end of data in the newest segment.
    tails_discarded: AtomicU64,
}

impl WalStats {
    /// Creates zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_append(&self, bytes: u64) {
        self.records_appended.fetch_add(1, Ordering::Relaxed);
        self.bytes_appended.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_segment_created(&self) {
        self.segments_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_segment_removed(&self) {
        self.segments_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_replay_session(&self) {
        self.replay_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_replayed(&self, bytes: u64) {
        self.records_replayed.fetch_add(1, Ordering::Relaxed);
        self.bytes_replayed.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_tail_discarded(&self) {
        self.tails_discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Records written.
    pub fn records_appended(&self) -> u64 {
        self.records_appended.load(Ordering::Relaxed)
    }

    /// Frame bytes written.
    pub fn bytes_appended(&self) -> u64 {
        self.bytes_appended.load(Ordering::Relaxed)
    }

    /// Explicit and per-write flushes.
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Segments created by this process.
    pub fn segments_created(&self) -> u64 {
        self.segments_created.load(Ordering::Relaxed)
    }

    /// Segments released and deleted.
    pub fn segments_removed(&self) -> u64 {
        self.segments_removed.load(Ordering::Relaxed)
    }

    /// Replay sessions opened.
    pub fn replay_sessions(&self) -> u64 {
        self.replay_sessions.load(Ordering::Relaxed)
    }

    /// Records yielded by replay sessions.
    pub fn records_replayed(&self) -> u64 {
        self.records_replayed.load(Ordering::Relaxed)
    }

    /// Frame bytes yielded by replay sessions.
    pub fn bytes_replayed(&self) -> u64 {
        self.bytes_replayed.load(Ordering::Relaxed)
    }

    /// Damaged tails treated as end of data.
    pub fn tails_discarded(&self) -> u64 {
        self.tails_discarded.load(Ordering::Relaxed)
    }

    /// Returns a point-in-time copy of all counters.
    pub fn snapshot(&self) -> WalStatsSnapshot {
        WalStatsSnapshot {
            records_appended: self.records_appended(),
            bytes_appended: self.bytes_appended(),
            flushes: self.flushes(),
            segments_created: self.segments_created(),
            segments_removed: self.segments_removed(),
            replay_sessions: self.replay_sessions(),
            records_replayed: self.records_replayed(),
            bytes_replayed: self.bytes_replayed(),
            tails_discarded: self.tails_discarded(),
        }
    }
}

/// A point-in-time copy of [`WalStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WalStatsSnapshot {
    /// Records written.
    pub records_appended: u64,
    /// Frame bytes written.
    pub bytes_appended: u64,
    /// Flushes performed.
    pub flushes: u64,
    /// Segments created.
    pub segments_created: u64,
    /// Segments removed.
    pub segments_removed: u64,
    /// Replay sessions opened.
    pub replay_sessions: u64,
    /// Records replayed.
    pub records_replayed: u64,
    /// Bytes replayed.
    pub bytes_replayed: u64,
    /// Damaged tails treated as end of data.
    pub tails_discarded: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        assert_eq!(WalStats::new().snapshot(), WalStatsSnapshot::default());
    }

    #[test]
    fn counters_accumulate() {
        let stats = WalStats::new();
        stats.record_append(100);
        stats.record_append(50);
        stats.record_replayed(30);
        stats.record_tail_discarded();

        let snap = stats.snapshot();
        assert_eq!(snap.records_appended, 2);
        assert_eq!(snap.bytes_appended, 150);
        assert_eq!(snap.records_replayed, 1);
        assert_eq!(snap.bytes_replayed, 30);
        assert_eq!(snap.tails_discarded, 1);
    }
}
