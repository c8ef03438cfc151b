//! Crash simulation for log recovery tests.
//!
//! Two families of helpers:
//!
//! 1. **Damage after the fact** - [`truncate_tail`], [`flip_byte`] and
//!    [`append_garbage`] edit a closed segment the way a torn write or bad
//!    sector would leave it.
//! 2. **Dying writers** - [`CrashingDirectory`] hands out
//!    [`CrashableBackend`]s that stop writing after a byte budget, leaving
//!    the last frame half written.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use partlog_testkit::crash::CrashingDirectory;
//!
//! let inner = Arc::new(InMemorySegmentDirectory::new());
//! let crashing = Arc::new(CrashingDirectory::new(inner.clone()));
//! let wal = WalManager::open(crashing.clone(), WalConfig::default())?;
//! crashing.crash_after(100);
//! // appends fail once 100 more bytes have been written
//! ```

use partlog_core::wal::SegmentDirectory;
use partlog_core::{CoreError, CoreResult};
use partlog_storage::{StorageBackend, StorageError, StorageResult};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Cuts `bytes` off the end of segment `index`.
///
/// Returns the new segment size.
///
/// # Errors
///
/// Returns an error if the segment is missing or smaller than `bytes`.
pub fn truncate_tail(dir: &dyn SegmentDirectory, index: u64, bytes: u64) -> CoreResult<u64> {
    let mut backend = dir.open_for_append(index)?;
    let size = backend.size()?;
    let new_size = size.checked_sub(bytes).ok_or_else(|| {
        CoreError::invalid_argument(format!("segment {index} has only {size} bytes"))
    })?;
    backend.truncate(new_size)?;
    backend.sync()?;
    debug!(segment = index, from = size, to = new_size, "truncated segment tail");
    Ok(new_size)
}

/// Inverts the byte at `offset` in segment `index`.
///
/// # Errors
///
/// Returns an error if the segment is missing or `offset` is past its end.
pub fn flip_byte(dir: &dyn SegmentDirectory, index: u64, offset: u64) -> CoreResult<()> {
    let mut backend = dir.open_for_append(index)?;
    let byte = backend.read_at(offset, 1)?;
    backend.write_at(offset, &[!byte[0]])?;
    backend.sync()?;
    debug!(segment = index, offset, "flipped byte");
    Ok(())
}

/// Appends raw bytes to segment `index`.
///
/// # Errors
///
/// Returns an error if the segment is missing or the write fails.
pub fn append_garbage(dir: &dyn SegmentDirectory, index: u64, bytes: &[u8]) -> CoreResult<()> {
    let mut backend = dir.open_for_append(index)?;
    backend.append(bytes)?;
    backend.sync()?;
    Ok(())
}

fn simulated(what: &str) -> StorageError {
    StorageError::Io(io::Error::new(io::ErrorKind::Other, what.to_string()))
}

/// Shared crash switch of a [`CrashingDirectory`] and its backends.
#[derive(Debug)]
struct CrashState {
    budget: AtomicUsize,
    written: AtomicUsize,
    crashed: AtomicBool,
    fail_on_sync: AtomicBool,
}

impl CrashState {
    fn new() -> Self {
        Self {
            budget: AtomicUsize::new(usize::MAX),
            written: AtomicUsize::new(0),
            crashed: AtomicBool::new(false),
            fail_on_sync: AtomicBool::new(false),
        }
    }

    /// How many bytes of a `len`-byte write may still land.
    fn admit(&self, len: usize) -> usize {
        if self.crashed.load(Ordering::SeqCst) {
            return 0;
        }
        let current = self.written.fetch_add(len, Ordering::SeqCst);
        let budget = self.budget.load(Ordering::SeqCst);
        if current.saturating_add(len) <= budget {
            return len;
        }
        self.crashed.store(true, Ordering::SeqCst);
        budget.saturating_sub(current)
    }
}

/// A storage backend wrapper that can simulate crashes.
///
/// Once the shared byte budget runs out, the write that crosses it lands
/// only partially and every later write or sync fails.
pub struct CrashableBackend {
    inner: Box<dyn StorageBackend>,
    state: Arc<CrashState>,
}

impl CrashableBackend {
    /// Wraps `inner` with its own crash switch.
    pub fn new(inner: Box<dyn StorageBackend>) -> Self {
        Self {
            inner,
            state: Arc::new(CrashState::new()),
        }
    }

    /// Fails writes once `bytes` more bytes have been written.
    pub fn crash_after(&self, bytes: usize) {
        let written = self.state.written.load(Ordering::SeqCst);
        self.state
            .budget
            .store(written.saturating_add(bytes), Ordering::SeqCst);
    }

    /// Returns whether the backend has crashed.
    pub fn has_crashed(&self) -> bool {
        self.state.crashed.load(Ordering::SeqCst)
    }

    fn check_sync(&self, what: &str) -> StorageResult<()> {
        if self.state.crashed.load(Ordering::SeqCst) {
            return Err(simulated(what));
        }
        if self.state.fail_on_sync.load(Ordering::SeqCst) {
            self.state.crashed.store(true, Ordering::SeqCst);
            return Err(simulated(what));
        }
        Ok(())
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let admitted = self.state.admit(data.len());
        if admitted == data.len() {
            return self.inner.append(data);
        }
        if admitted > 0 {
            let _ = self.inner.append(&data[..admitted]);
        }
        Err(simulated("simulated crash during append"))
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()> {
        let admitted = self.state.admit(data.len());
        if admitted == data.len() {
            return self.inner.write_at(offset, data);
        }
        if admitted > 0 {
            let _ = self.inner.write_at(offset, &data[..admitted]);
        }
        Err(simulated("simulated crash during write"))
    }

    fn preallocate(&mut self, len: u64) -> StorageResult<()> {
        self.inner.preallocate(len)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.check_sync("simulated crash during flush")?;
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.check_sync("simulated crash during sync")?;
        self.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }
}

/// Segment directory whose writable handles share one crash switch.
///
/// Reads and listings go straight to the wrapped directory, so a log can be
/// reopened on `inner` after the crash to observe what survived.
pub struct CrashingDirectory {
    inner: Arc<dyn SegmentDirectory>,
    state: Arc<CrashState>,
}

impl CrashingDirectory {
    /// Wraps `inner`. Nothing fails until a budget is set.
    pub fn new(inner: Arc<dyn SegmentDirectory>) -> Self {
        Self {
            inner,
            state: Arc::new(CrashState::new()),
        }
    }

    /// Fails writes once `bytes` more bytes have been written.
    pub fn crash_after(&self, bytes: usize) {
        let written = self.state.written.load(Ordering::SeqCst);
        self.state
            .budget
            .store(written.saturating_add(bytes), Ordering::SeqCst);
    }

    /// Sets whether flush and sync fail.
    pub fn set_fail_on_sync(&self, fail: bool) {
        self.state.fail_on_sync.store(fail, Ordering::SeqCst);
    }

    /// Returns whether a crash has been triggered.
    pub fn has_crashed(&self) -> bool {
        self.state.crashed.load(Ordering::SeqCst)
    }

    fn wrap(&self, inner: Box<dyn StorageBackend>) -> Box<dyn StorageBackend> {
        Box::new(CrashableBackend {
            inner,
            state: Arc::clone(&self.state),
        })
    }
}

impl SegmentDirectory for CrashingDirectory {
    fn list_segments(&self) -> CoreResult<Vec<u64>> {
        self.inner.list_segments()
    }

    fn open_for_read(&self, index: u64) -> CoreResult<Box<dyn StorageBackend>> {
        self.inner.open_for_read(index)
    }

    fn create_segment(&self, index: u64, header: &[u8]) -> CoreResult<Box<dyn StorageBackend>> {
        if self.has_crashed() {
            return Err(simulated("simulated crash before segment creation").into());
        }
        Ok(self.wrap(self.inner.create_segment(index, header)?))
    }

    fn open_for_append(&self, index: u64) -> CoreResult<Box<dyn StorageBackend>> {
        Ok(self.wrap(self.inner.open_for_append(index)?))
    }

    fn remove(&self, index: u64) -> CoreResult<()> {
        self.inner.remove(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{collect_replay, data_record};
    use partlog_core::wal::HEADER_FRAME_SIZE;
    use partlog_core::{InMemorySegmentDirectory, LogReplay, WalConfig, WalManager};
    use partlog_storage::InMemoryBackend;

    #[test]
    fn backend_partial_write_then_dead() {
        let mut backend = CrashableBackend::new(Box::new(InMemoryBackend::new()));
        backend.append(b"0123").unwrap();
        backend.crash_after(2);

        assert!(backend.append(b"abcd").is_err());
        assert!(backend.has_crashed());
        assert_eq!(backend.read_at(0, 6).unwrap(), b"0123ab");
        assert!(backend.append(b"x").is_err());
        assert!(backend.sync().is_err());
    }

    #[test]
    fn truncate_and_garbage_edit_segments() {
        let dir = InMemorySegmentDirectory::new();
        dir.create_segment(0, b"HEADER").unwrap();
        append_garbage(&dir, 0, b"tail").unwrap();
        assert_eq!(truncate_tail(&dir, 0, 3).unwrap(), 7);
        assert_eq!(dir.segment_data(0).unwrap(), b"HEADERt");
        assert!(truncate_tail(&dir, 0, 100).is_err());

        flip_byte(&dir, 0, 0).unwrap();
        assert_eq!(dir.segment_data(0).unwrap()[0], !b'H');
    }

    #[test]
    fn crash_mid_append_keeps_earlier_records() {
        let inner = Arc::new(InMemorySegmentDirectory::new());
        let crashing = Arc::new(CrashingDirectory::new(inner.clone()));
        let wal = WalManager::open(crashing.clone(), WalConfig::default()).unwrap();

        let first = wal.append(&data_record(1, 0, 1, b"first")).unwrap();
        crashing.crash_after(6);
        assert!(wal.append(&data_record(1, 0, 2, b"second")).is_err());
        assert!(crashing.has_crashed());
        assert!(wal.flush().is_err());
        drop(wal);

        let replayed = collect_replay(LogReplay::open(inner.clone(), None).unwrap()).unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].0, first);

        let reopened = WalManager::open(inner.clone(), WalConfig::default()).unwrap();
        assert_eq!(
            inner.segment_data(0).unwrap().len() as u32,
            first.end_offset().unwrap()
        );
        assert_eq!(reopened.current_segment(), 1);
        assert_eq!(reopened.head().offset(), HEADER_FRAME_SIZE as u32);
    }
}
