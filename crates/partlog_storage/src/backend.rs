//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level storage backend holding the bytes of one log segment.
///
/// Storage backends are **opaque byte stores**. partlog owns all format
/// interpretation - backends do not understand segment headers or records.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `preallocate` only ever grows the store, filling with zero bytes
/// - `flush` ensures all written data is durable
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The read would extend beyond the current size
    /// - An I/O error occurs
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the storage.
    ///
    /// Returns the offset where the data was written.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs or the handle is read-only.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Writes data at an absolute offset, growing the store if needed.
    ///
    /// Used by the segment writer when the segment was preallocated and the
    /// logical write position is below the physical size.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs or the handle is read-only.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()>;

    /// Grows the store to at least `len` bytes, padding with zeros.
    ///
    /// Does nothing if the store is already `len` bytes or larger.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs or the handle is read-only.
    fn preallocate(&mut self, len: u64) -> StorageResult<()>;

    /// Flushes all pending writes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current physical size of the storage in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Syncs all data and metadata to durable storage.
    ///
    /// This is a stronger guarantee than `flush`: file metadata (size)
    /// is also durable when it returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Truncates the storage to the given size.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The truncation fails
    /// - `new_size` is greater than current size
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
