//! Test fixtures and log helpers.
//!
//! Provides convenience functions for setting up logs on temporary
//! directories or in memory, and for building common records.

use partlog_core::wal::SegmentDirectory;
use partlog_core::{
    CoreResult, FsSegmentDirectory, GroupId, InMemorySegmentDirectory, LogPointer, LogReplay,
    PageId, PartitionId, WalConfig, WalManager, WalRecord,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// A file-backed log with automatic cleanup.
///
/// The segment directory stays locked while the fixture lives. Replay
/// sessions hold the directory too, so drop them before [`TestLog::reopen`].
pub struct TestLog {
    wal: WalManager,
    dir: Arc<FsSegmentDirectory>,
    config: WalConfig,
    temp_dir: TempDir,
}

impl TestLog {
    /// Creates a log in a fresh temporary directory with default settings.
    pub fn file() -> Self {
        Self::with_config(WalConfig::default())
    }

    /// Creates a log in a fresh temporary directory.
    pub fn with_config(config: WalConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let (dir, wal) = open_at(temp_dir.path(), &config);
        Self {
            wal,
            dir,
            config,
            temp_dir,
        }
    }

    /// Closes and reopens the log, as a process restart would.
    pub fn reopen(self) -> Self {
        self.reopen_after(|_| Ok(()))
    }

    /// Closes the log, runs `damage` on its directory, then reopens it.
    pub fn reopen_after<F>(self, damage: F) -> Self
    where
        F: FnOnce(&dyn SegmentDirectory) -> CoreResult<()>,
    {
        let Self {
            wal,
            dir,
            config,
            temp_dir,
        } = self;
        drop(wal);
        damage(dir.as_ref()).expect("Failed to damage log");
        drop(dir);

        let (dir, wal) = open_at(temp_dir.path(), &config);
        Self {
            wal,
            dir,
            config,
            temp_dir,
        }
    }

    /// Closes the log and hands back the directory without opening a writer.
    ///
    /// Useful for recovery runs that must see the log exactly as left.
    pub fn close(self) -> (Arc<FsSegmentDirectory>, TempDir) {
        drop(self.wal);
        (self.dir, self.temp_dir)
    }

    /// The segment directory.
    pub fn directory(&self) -> Arc<FsSegmentDirectory> {
        Arc::clone(&self.dir)
    }

    /// Path of the log directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }
}

fn open_at(path: &Path, config: &WalConfig) -> (Arc<FsSegmentDirectory>, WalManager) {
    let dir = Arc::new(FsSegmentDirectory::open(path, true).expect("Failed to open log directory"));
    let wal = WalManager::open(dir.clone(), config.clone()).expect("Failed to open log");
    (dir, wal)
}

impl std::ops::Deref for TestLog {
    type Target = WalManager;

    fn deref(&self) -> &Self::Target {
        &self.wal
    }
}

/// Opens a log over a fresh in-memory directory.
pub fn memory_log(config: WalConfig) -> (Arc<InMemorySegmentDirectory>, WalManager) {
    let dir = Arc::new(InMemorySegmentDirectory::new());
    let wal = WalManager::open(dir.clone(), config).expect("Failed to open in-memory log");
    (dir, wal)
}

/// Builds a data record.
pub fn data_record(group: u32, partition: u16, counter: u64, payload: &[u8]) -> WalRecord {
    WalRecord::Data {
        group_id: GroupId::new(group),
        partition: PartitionId::new(partition),
        counter,
        payload: payload.to_vec(),
    }
}

/// Builds a page update whose bytes live in the data record at `reference`.
pub fn page_update_ref(
    group: u32,
    page: u64,
    item: u16,
    payload_size: u32,
    reference: LogPointer,
) -> WalRecord {
    WalRecord::PageUpdate {
        group_id: GroupId::new(group),
        page_id: PageId::new(page),
        item_id: item,
        payload_size,
        reference: Some(reference),
        payload: Vec::new(),
    }
}

/// Drains a replay session.
///
/// # Errors
///
/// Returns the first replay error.
pub fn collect_replay(replay: LogReplay) -> CoreResult<Vec<(LogPointer, WalRecord)>> {
    replay.collect()
}

/// Installs a test log subscriber honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_log_survives_reopen() {
        init_tracing();
        let log = TestLog::file();
        let ptr = log.append(&data_record(1, 0, 1, b"kept")).unwrap();
        log.flush().unwrap();
        assert!(log.path().join("LOCK").exists());

        let log = log.reopen();
        assert_eq!(log.current_segment(), 1);
        assert_eq!(log.read_record(ptr).unwrap(), data_record(1, 0, 1, b"kept"));
    }

    #[test]
    fn memory_log_replays() {
        let (dir, wal) = memory_log(WalConfig::default());
        wal.append(&data_record(2, 3, 1, b"x")).unwrap();

        let records = collect_replay(LogReplay::open(dir, None).unwrap()).unwrap();
        assert_eq!(records.len(), 1);
    }
}
