//! Reference counts on segments held by readers and rebalance sessions.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Tracks which segments are in use.
///
/// Cloning shares the underlying table. A segment is pinned while at least
/// one [`SegmentPin`] for it is alive; the log never removes a pinned
/// segment or any segment after the lowest pinned one.
#[derive(Clone, Default)]
pub struct SegmentPins {
    counts: Arc<Mutex<BTreeMap<u64, usize>>>,
}

impl SegmentPins {
    /// Creates an empty pin table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins `index` until the returned guard is dropped.
    #[must_use]
    pub fn pin(&self, index: u64) -> SegmentPin {
        *self.counts.lock().entry(index).or_insert(0) += 1;
        SegmentPin {
            index,
            counts: Arc::clone(&self.counts),
        }
    }

    /// Lowest pinned segment, if any.
    #[must_use]
    pub fn min_pinned(&self) -> Option<u64> {
        self.counts.lock().keys().next().copied()
    }

    /// Returns true if `index` has a live pin.
    #[must_use]
    pub fn is_pinned(&self, index: u64) -> bool {
        self.counts.lock().contains_key(&index)
    }

    /// Number of live pins on `index`.
    #[must_use]
    pub fn count(&self, index: u64) -> usize {
        self.counts.lock().get(&index).copied().unwrap_or(0)
    }
}

impl fmt::Debug for SegmentPins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.counts.lock().iter()).finish()
    }
}

/// Guard holding one pin on a segment.
pub struct SegmentPin {
    index: u64,
    counts: Arc<Mutex<BTreeMap<u64, usize>>>,
}

impl SegmentPin {
    /// Pinned segment index.
    #[must_use]
    pub fn index(&self) -> u64 {
        self.index
    }
}

impl fmt::Debug for SegmentPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SegmentPin").field(&self.index).finish()
    }
}

impl Drop for SegmentPin {
    fn drop(&mut self) {
        let mut counts = self.counts.lock();
        if let Some(count) = counts.get_mut(&self.index) {
            *count -= 1;
            if *count == 0 {
                counts.remove(&self.index);
            }
        }
    }
}
