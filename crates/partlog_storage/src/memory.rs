//! In-memory storage backend for testing.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory storage backend.
///
/// The byte buffer sits behind an `Arc`, so [`InMemoryBackend::share`]
/// produces another handle over the same bytes. An in-memory segment
/// directory uses this to give every reader its own handle while the
/// writer keeps appending.
///
/// # Example
///
/// ```rust
/// use partlog_storage::{StorageBackend, InMemoryBackend};
///
/// let mut backend = InMemoryBackend::new();
/// let reader = backend.share();
/// backend.append(b"test data").unwrap();
/// assert_eq!(reader.size().unwrap(), 9);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
    read_only: bool,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory backend with pre-existing data.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
            read_only: false,
        }
    }

    /// Returns another writable handle over the same buffer.
    #[must_use]
    pub fn share(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            read_only: false,
        }
    }

    /// Returns a read-only handle over the same buffer.
    #[must_use]
    pub fn share_read_only(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            read_only: true,
        }
    }

    /// Returns a copy of all data in the backend.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::ReadOnly("in-memory handle".to_string()));
        }
        Ok(())
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);

        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, new_data: &[u8]) -> StorageResult<u64> {
        self.check_writable()?;
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(new_data);
        Ok(offset)
    }

    fn write_at(&mut self, offset: u64, new_data: &[u8]) -> StorageResult<()> {
        self.check_writable()?;
        let mut data = self.data.write();
        let start = offset as usize;
        let end = start + new_data.len();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(new_data);
        Ok(())
    }

    fn preallocate(&mut self, len: u64) -> StorageResult<()> {
        self.check_writable()?;
        let mut data = self.data.write();
        if (data.len() as u64) < len {
            data.resize(len as usize, 0);
        }
        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.check_writable()?;
        let mut data = self.data.write();
        let size = data.len() as u64;

        if new_size > size {
            return Err(StorageError::InvalidTruncate {
                requested: new_size,
                size,
            });
        }

        data.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_append_returns_correct_offset() {
        let mut backend = InMemoryBackend::new();

        let offset1 = backend.append(b"hello").unwrap();
        assert_eq!(offset1, 0);

        let offset2 = backend.append(b" world").unwrap();
        assert_eq!(offset2, 5);

        assert_eq!(backend.size().unwrap(), 11);
    }

    #[test]
    fn memory_read_at_past_end_fails() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"hello").unwrap();

        let result = backend.read_at(3, 10);
        assert!(matches!(result, Err(StorageError::ReadPastEnd { .. })));
    }

    #[test]
    fn memory_shared_handles_see_same_bytes() {
        let mut writer = InMemoryBackend::new();
        let reader = writer.share_read_only();

        writer.append(b"abc").unwrap();
        assert_eq!(reader.read_at(0, 3).unwrap(), b"abc");
    }

    #[test]
    fn memory_read_only_rejects_writes() {
        let backend = InMemoryBackend::with_data(vec![1, 2, 3]);
        let mut reader = backend.share_read_only();

        assert!(matches!(reader.append(b"x"), Err(StorageError::ReadOnly(_))));
        assert!(matches!(reader.write_at(0, b"x"), Err(StorageError::ReadOnly(_))));
        assert!(matches!(reader.preallocate(10), Err(StorageError::ReadOnly(_))));
    }

    #[test]
    fn memory_preallocate_pads_with_zeros() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"hd").unwrap();
        backend.preallocate(8).unwrap();

        assert_eq!(backend.data(), vec![b'h', b'd', 0, 0, 0, 0, 0, 0]);

        // Never shrinks.
        backend.preallocate(4).unwrap();
        assert_eq!(backend.size().unwrap(), 8);
    }

    #[test]
    fn memory_write_at_inside_preallocated_region() {
        let mut backend = InMemoryBackend::new();
        backend.preallocate(6).unwrap();
        backend.write_at(2, b"xy").unwrap();

        assert_eq!(backend.data(), vec![0, 0, b'x', b'y', 0, 0]);
    }

    #[test]
    fn memory_write_at_grows() {
        let mut backend = InMemoryBackend::with_data(b"ab".to_vec());
        backend.write_at(2, b"cd").unwrap();
        assert_eq!(backend.data(), b"abcd".to_vec());
    }

    #[test]
    fn memory_truncate_partial() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"hello world").unwrap();

        backend.truncate(5).unwrap();
        assert_eq!(backend.read_at(0, 5).unwrap(), b"hello");
    }

    #[test]
    fn memory_truncate_to_larger_size_fails() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"hello").unwrap();

        let result = backend.truncate(100);
        assert!(matches!(result, Err(StorageError::InvalidTruncate { .. })));
    }
}
