//! Segment directories: where segment byte stores come from.

use crate::error::{CoreError, CoreResult};
use partlog_storage::{InMemoryBackend, StorageBackend};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Source of segment storage for the log.
///
/// A directory maps segment indexes to byte stores. Segments become visible
/// through [`list_segments`](Self::list_segments) only once their header is
/// in place, so a reader never observes a segment without one.
pub trait SegmentDirectory: Send + Sync {
    /// Existing segment indexes in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    fn list_segments(&self) -> CoreResult<Vec<u64>>;

    /// Opens a read handle on a segment.
    ///
    /// # Errors
    ///
    /// Returns `SegmentMissing` if the segment does not exist.
    fn open_for_read(&self, index: u64) -> CoreResult<Box<dyn StorageBackend>>;

    /// Creates and publishes a new segment starting with `header`.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment already exists or cannot be written.
    fn create_segment(&self, index: u64, header: &[u8]) -> CoreResult<Box<dyn StorageBackend>>;

    /// Opens a write handle on an existing segment.
    ///
    /// # Errors
    ///
    /// Returns `SegmentMissing` if the segment does not exist.
    fn open_for_append(&self, index: u64) -> CoreResult<Box<dyn StorageBackend>>;

    /// Deletes a segment. Existing read handles stay usable.
    ///
    /// # Errors
    ///
    /// Returns `SegmentMissing` if the segment does not exist.
    fn remove(&self, index: u64) -> CoreResult<()>;
}

/// Segment directory kept entirely in memory.
#[derive(Debug, Default)]
pub struct InMemorySegmentDirectory {
    segments: RwLock<BTreeMap<u64, InMemoryBackend>>,
}

impl InMemorySegmentDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a segment with raw contents, replacing any existing one.
    ///
    /// Used to stage damaged or foreign segments in tests.
    pub fn insert_raw(&self, index: u64, data: Vec<u8>) {
        self.segments
            .write()
            .insert(index, InMemoryBackend::with_data(data));
    }

    /// Copy of a segment's bytes.
    #[must_use]
    pub fn segment_data(&self, index: u64) -> Option<Vec<u8>> {
        self.segments.read().get(&index).map(InMemoryBackend::data)
    }
}

impl SegmentDirectory for InMemorySegmentDirectory {
    fn list_segments(&self) -> CoreResult<Vec<u64>> {
        Ok(self.segments.read().keys().copied().collect())
    }

    fn open_for_read(&self, index: u64) -> CoreResult<Box<dyn StorageBackend>> {
        self.segments
            .read()
            .get(&index)
            .map(|b| Box::new(b.share_read_only()) as Box<dyn StorageBackend>)
            .ok_or(CoreError::SegmentMissing { index })
    }

    fn create_segment(&self, index: u64, header: &[u8]) -> CoreResult<Box<dyn StorageBackend>> {
        let mut segments = self.segments.write();
        if segments.contains_key(&index) {
            return Err(CoreError::invalid_argument(format!(
                "segment {index} already exists"
            )));
        }
        let backend = InMemoryBackend::with_data(header.to_vec());
        let handle = backend.share();
        segments.insert(index, backend);
        Ok(Box::new(handle))
    }

    fn open_for_append(&self, index: u64) -> CoreResult<Box<dyn StorageBackend>> {
        self.segments
            .read()
            .get(&index)
            .map(|b| Box::new(b.share()) as Box<dyn StorageBackend>)
            .ok_or(CoreError::SegmentMissing { index })
    }

    fn remove(&self, index: u64) -> CoreResult<()> {
        self.segments
            .write()
            .remove(&index)
            .map(|_| ())
            .ok_or(CoreError::SegmentMissing { index })
    }
}
