//! Partition update counter.
//!
//! Every update to a partition gets a 1-based update number. Writers
//! reserve a block of numbers before mutating, log the mutation, then
//! report the block complete. Completions may arrive out of order; the
//! counter keeps:
//!
//! - `applied`: highest N such that updates `1..=N` are all complete
//! - `reserved`: highest number handed out to a writer
//! - `gaps`: completed blocks above `applied` that are waiting for a lower
//!   block to finish
//!
//! A replica whose counter is sequential (no gaps) can be caught up by
//! replaying the log from a known pointer; one with holes may need a full
//! partition copy.
//!
//! ## Concurrency
//!
//! `reserve` is a single atomic fetch-and-add. Completion takes a short
//! mutex around the gap map; observers are notified after it is released.

mod snapshot;

pub use snapshot::CounterSnapshot;

use crate::config::CounterConfig;
use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Receives counter state changes.
///
/// Observers are optional diagnostics injected per counter; they are never
/// called while the counter's internal lock is held.
pub trait CounterObserver: Send + Sync {
    /// A completed block could not be folded and was recorded as a gap.
    fn on_gap_recorded(&self, start: u64, len: u64, gap_count: usize) {
        let _ = (start, len, gap_count);
    }

    /// `applied` moved forward.
    fn on_applied(&self, from: u64, to: u64) {
        let _ = (from, to);
    }
}

#[derive(Debug, Default)]
struct GapState {
    applied: u64,
    /// start -> end (exclusive) of each completed out-of-order block.
    gaps: BTreeMap<u64, u64>,
}

impl GapState {
    /// Folds every gap that now touches `applied`.
    fn fold(&mut self) {
        while let Some(entry) = self.gaps.first_entry() {
            if *entry.key() != self.applied + 1 {
                break;
            }
            self.applied = entry.remove() - 1;
        }
    }

    fn to_snapshot(&self) -> CounterSnapshot {
        CounterSnapshot::new(
            self.applied,
            self.gaps.iter().map(|(&s, &e)| (s, e - s)).collect(),
        )
    }
}

enum Event {
    Applied { from: u64, to: u64 },
    Gap { start: u64, len: u64, count: usize },
}

/// Per-partition bookkeeping of applied and reserved update numbers.
pub struct PartitionUpdateCounter {
    reserved: AtomicU64,
    /// Mirror of `state.applied` for lock-free reads.
    applied: AtomicU64,
    initial: AtomicU64,
    state: Mutex<GapState>,
    config: CounterConfig,
    observer: Option<Arc<dyn CounterObserver>>,
}

impl PartitionUpdateCounter {
    /// Creates an empty counter with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(CounterConfig::default())
    }

    /// Creates an empty counter.
    #[must_use]
    pub fn with_config(config: CounterConfig) -> Self {
        Self {
            reserved: AtomicU64::new(0),
            applied: AtomicU64::new(0),
            initial: AtomicU64::new(0),
            state: Mutex::new(GapState::default()),
            config,
            observer: None,
        }
    }

    /// Attaches an observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn CounterObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Claims `delta` consecutive update numbers and returns the first one.
    ///
    /// Never blocks and never fails.
    pub fn reserve(&self, delta: u64) -> u64 {
        self.reserved.fetch_add(delta, Ordering::AcqRel) + 1
    }

    /// Reports that updates `start..start + delta` are durably written.
    ///
    /// Returns `true` if the completion was recorded (either `applied`
    /// advanced or a new gap was stored) and `false` if the whole range was
    /// already covered by `applied`.
    ///
    /// # Errors
    ///
    /// - `CounterProtocol` if `delta` or `start` is zero, the range
    ///   straddles `applied`, or it overlaps an already-recorded gap
    /// - `TooManyGaps` if recording a new gap would exceed `max_gaps`
    pub fn apply_completed(&self, start: u64, delta: u64) -> CoreResult<bool> {
        if delta == 0 {
            return Err(CoreError::counter_protocol(format!(
                "empty completion at {start}"
            )));
        }
        if start == 0 {
            return Err(CoreError::counter_protocol(
                "update numbers start at 1, got completion at 0",
            ));
        }
        let end = start.checked_add(delta).ok_or_else(|| {
            CoreError::counter_protocol(format!("completion ({start}, {delta}) overflows"))
        })?;

        let event = {
            let mut st = self.state.lock();
            let applied = st.applied;

            if end - 1 <= applied {
                debug!(start, delta, applied, "completion already covered");
                return Ok(false);
            }
            if start <= applied {
                return Err(CoreError::counter_protocol(format!(
                    "completion ({start}, {delta}) straddles applied {applied}"
                )));
            }
            if let Some((&gap_start, &gap_end)) = st.gaps.range(..end).next_back() {
                if gap_end > start {
                    return Err(CoreError::counter_protocol(format!(
                        "completion ({start}, {delta}) overlaps gap ({gap_start}, {})",
                        gap_end - gap_start
                    )));
                }
            }

            if start == applied + 1 {
                self.reserved.fetch_max(end - 1, Ordering::AcqRel);
                st.applied = end - 1;
                st.fold();
                self.applied.store(st.applied, Ordering::Release);
                Event::Applied {
                    from: applied,
                    to: st.applied,
                }
            } else {
                let pred = st
                    .gaps
                    .range(..start)
                    .next_back()
                    .filter(|&(_, &e)| e == start)
                    .map(|(&s, _)| s);
                let succ = st.gaps.get(&end).copied();

                if pred.is_none() && succ.is_none() && st.gaps.len() >= self.config.max_gaps {
                    return Err(CoreError::TooManyGaps {
                        limit: self.config.max_gaps,
                        start,
                    });
                }
                self.reserved.fetch_max(end - 1, Ordering::AcqRel);

                let mut merged_start = start;
                let mut merged_end = end;
                if let Some(s) = pred {
                    st.gaps.remove(&s);
                    merged_start = s;
                }
                if let Some(e) = succ {
                    st.gaps.remove(&end);
                    merged_end = e;
                }
                st.gaps.insert(merged_start, merged_end);

                let count = st.gaps.len();
                if count >= self.config.warn_gaps {
                    warn!(
                        gaps = count,
                        limit = self.config.max_gaps,
                        applied,
                        "update counter gap set is growing"
                    );
                }
                Event::Gap { start, len: delta, count }
            }
        };

        self.notify(event);
        Ok(true)
    }

    /// Claims `delta` update numbers and completes them in one step.
    ///
    /// For partitions whose writers apply updates as they number them, so
    /// there is no window between reserving and completing. Returns the
    /// first number of the block.
    ///
    /// # Errors
    ///
    /// Returns `CounterProtocol` if `delta` is zero and `TooManyGaps` if a
    /// concurrent `reserve` leaves a hole below the block and the gap set
    /// is full.
    pub fn next(&self, delta: u64) -> CoreResult<u64> {
        let start = self.reserve(delta);
        self.apply_completed(start, delta)?;
        Ok(start)
    }

    /// Returns true if update `n` is known complete, either below `applied`
    /// or inside a recorded gap.
    #[must_use]
    pub fn is_completed(&self, n: u64) -> bool {
        if n == 0 {
            return false;
        }
        let st = self.state.lock();
        n <= st.applied
            || st
                .gaps
                .range(..=n)
                .next_back()
                .is_some_and(|(_, &end)| n < end)
    }

    /// Returns `applied`, the low-water-mark.
    #[must_use]
    pub fn low(&self) -> u64 {
        self.applied.load(Ordering::Acquire)
    }

    /// Returns `reserved`, the high-water-mark.
    #[must_use]
    pub fn high(&self) -> u64 {
        self.reserved.load(Ordering::Acquire)
    }

    /// Returns true if no out-of-order holes exist.
    #[must_use]
    pub fn is_sequential(&self) -> bool {
        self.state.lock().gaps.is_empty()
    }

    /// Number of recorded gaps.
    #[must_use]
    pub fn gap_count(&self) -> usize {
        self.state.lock().gaps.len()
    }

    /// Counter value when the partition was opened or last rebalanced.
    #[must_use]
    pub fn initial(&self) -> u64 {
        self.initial.load(Ordering::Acquire)
    }

    /// Records the counter value a rebalance started from.
    pub fn set_initial(&self, value: u64) {
        self.initial.store(value, Ordering::Release);
    }

    /// Produces the minimal persistable representation.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        self.state.lock().to_snapshot()
    }

    /// Seeds the counter from persisted state.
    ///
    /// `reserved` becomes the highest number covered by `applied` or a gap.
    /// Gaps touching each other or `applied` are merged/folded.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the snapshot's gap list is inconsistent.
    pub fn restore(&self, snapshot: &CounterSnapshot) -> CoreResult<()> {
        snapshot.validate()?;

        let mut st = self.state.lock();
        st.applied = snapshot.applied;
        st.gaps.clear();

        let mut last: Option<(u64, u64)> = None;
        for &(start, len) in &snapshot.gaps {
            let end = start + len;
            last = match last {
                Some((s, e)) if e == start => Some((s, end)),
                Some((s, e)) => {
                    st.gaps.insert(s, e);
                    Some((start, end))
                }
                None => Some((start, end)),
            };
        }
        if let Some((s, e)) = last {
            st.gaps.insert(s, e);
        }
        st.fold();

        let highest = st.gaps.values().next_back().map_or(st.applied, |&e| e - 1);
        self.applied.store(st.applied, Ordering::Release);
        self.reserved.store(highest, Ordering::Release);
        self.initial.store(st.applied, Ordering::Release);

        debug!(
            applied = st.applied,
            gaps = st.gaps.len(),
            reserved = highest,
            "restored update counter"
        );
        Ok(())
    }

    /// Clears all state back to an empty partition.
    pub fn reset(&self) {
        let mut st = self.state.lock();
        st.applied = 0;
        st.gaps.clear();
        self.applied.store(0, Ordering::Release);
        self.reserved.store(0, Ordering::Release);
        self.initial.store(0, Ordering::Release);
    }

    /// Closes every hole below the highest recorded gap.
    ///
    /// Used when the partition's history is declared final (for example
    /// after a primary change): the updates that never completed are given
    /// up on and `applied` jumps to the end of the last gap. Returns the
    /// abandoned ranges as `(start, len)`.
    pub fn finalize_gaps(&self) -> Vec<(u64, u64)> {
        let (missing, from, to) = {
            let mut st = self.state.lock();
            let from = st.applied;
            let mut missing = Vec::with_capacity(st.gaps.len());
            let gaps = std::mem::take(&mut st.gaps);
            for (start, end) in gaps {
                missing.push((st.applied + 1, start - st.applied - 1));
                st.applied = end - 1;
            }
            self.applied.store(st.applied, Ordering::Release);
            (missing, from, st.applied)
        };

        if !missing.is_empty() {
            warn!(holes = missing.len(), from, to, "finalized update counter with holes");
            self.notify(Event::Applied { from, to });
        }
        missing
    }

    /// Moves `applied` directly to `value`, e.g. after a full partition copy.
    ///
    /// Gaps at or below `value` are dropped; a gap straddling it is folded.
    ///
    /// # Errors
    ///
    /// Returns `CounterProtocol` if `value` is below `applied`.
    pub fn update_to(&self, value: u64) -> CoreResult<()> {
        let (from, to) = {
            let mut st = self.state.lock();
            let from = st.applied;
            if value < from {
                return Err(CoreError::counter_protocol(format!(
                    "cannot move applied back from {from} to {value}"
                )));
            }
            if value == from {
                return Ok(());
            }

            st.applied = value;
            while let Some(entry) = st.gaps.first_entry() {
                if *entry.key() > value + 1 {
                    break;
                }
                let end = entry.remove();
                st.applied = st.applied.max(end - 1);
            }
            st.fold();

            self.applied.store(st.applied, Ordering::Release);
            self.reserved.fetch_max(st.applied, Ordering::AcqRel);
            (from, st.applied)
        };

        self.notify(Event::Applied { from, to });
        Ok(())
    }

    fn notify(&self, event: Event) {
        let Some(observer) = &self.observer else {
            return;
        };
        match event {
            Event::Applied { from, to } => observer.on_applied(from, to),
            Event::Gap { start, len, count } => observer.on_gap_recorded(start, len, count),
        }
    }
}

impl Default for PartitionUpdateCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PartitionUpdateCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.lock();
        f.debug_struct("PartitionUpdateCounter")
            .field("applied", &st.applied)
            .field("reserved", &self.high())
            .field("gaps", &st.gaps.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::seq::SliceRandom;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn reserve_returns_first_number() {
        let counter = PartitionUpdateCounter::new();
        assert_eq!(counter.reserve(5), 1);
        assert_eq!(counter.high(), 5);
        assert_eq!(counter.reserve(2), 6);
        assert_eq!(counter.high(), 7);
        assert_eq!(counter.low(), 0);
    }

    #[test]
    fn out_of_order_block_folds_on_completion() {
        let counter = PartitionUpdateCounter::new();
        assert_eq!(counter.reserve(5), 1);

        // 3..=5 finishes first.
        assert!(counter.apply_completed(3, 3).unwrap());
        assert_eq!(counter.low(), 0);
        assert!(!counter.is_sequential());
        assert_eq!(counter.snapshot().gaps, vec![(3, 3)]);

        // 1..=2 closes the hole and folds the gap.
        assert!(counter.apply_completed(1, 2).unwrap());
        assert_eq!(counter.low(), 5);
        assert_eq!(counter.low(), counter.high());
        assert!(counter.is_sequential());
    }

    #[test]
    fn adjacent_gaps_merge() {
        let counter = PartitionUpdateCounter::new();
        counter.reserve(10);

        counter.apply_completed(4, 2).unwrap();
        counter.apply_completed(8, 3).unwrap();
        counter.apply_completed(6, 2).unwrap();

        assert_eq!(counter.snapshot().gaps, vec![(4, 7)]);
        counter.apply_completed(1, 3).unwrap();
        assert_eq!(counter.low(), 10);
        assert_eq!(counter.gap_count(), 0);
    }

    #[test]
    fn covered_completion_is_noop() {
        let counter = PartitionUpdateCounter::new();
        counter.reserve(4);
        counter.apply_completed(1, 4).unwrap();

        assert!(!counter.apply_completed(2, 2).unwrap());
        assert_eq!(counter.low(), 4);
    }

    #[test]
    fn protocol_errors_are_loud() {
        let counter = PartitionUpdateCounter::new();
        counter.reserve(10);
        counter.apply_completed(1, 3).unwrap();
        counter.apply_completed(6, 2).unwrap();

        let zero = counter.apply_completed(4, 0);
        assert!(matches!(zero, Err(CoreError::CounterProtocol { .. })));

        let straddle = counter.apply_completed(3, 2);
        assert!(matches!(straddle, Err(CoreError::CounterProtocol { .. })));

        let double = counter.apply_completed(7, 1);
        assert!(matches!(double, Err(CoreError::CounterProtocol { .. })));

        let overlap_low = counter.apply_completed(5, 2);
        assert!(matches!(overlap_low, Err(CoreError::CounterProtocol { .. })));

        assert!(counter.apply_completed(0, 1).is_err());

        // State untouched by the rejected calls.
        assert_eq!(counter.snapshot(), CounterSnapshot::new(3, vec![(6, 2)]));
    }

    #[test]
    fn is_completed_covers_applied_and_gaps() {
        let counter = PartitionUpdateCounter::new();
        counter.reserve(10);
        counter.apply_completed(1, 2).unwrap();
        counter.apply_completed(5, 3).unwrap();

        assert!(!counter.is_completed(0));
        assert!(counter.is_completed(2));
        assert!(!counter.is_completed(3));
        assert!(counter.is_completed(5));
        assert!(counter.is_completed(7));
        assert!(!counter.is_completed(8));
    }

    #[test]
    fn next_reserves_and_completes() {
        let counter = PartitionUpdateCounter::new();
        assert_eq!(counter.next(1).unwrap(), 1);
        assert_eq!(counter.next(3).unwrap(), 2);
        assert_eq!(counter.low(), 4);
        assert_eq!(counter.high(), 4);
        assert!(counter.is_sequential());

        // An outstanding reservation below leaves the block as a gap.
        let pending = counter.reserve(2);
        assert_eq!(counter.next(1).unwrap(), 7);
        assert_eq!(counter.snapshot(), CounterSnapshot::new(4, vec![(7, 1)]));
        counter.apply_completed(pending, 2).unwrap();
        assert_eq!(counter.low(), 7);

        assert!(matches!(counter.next(0), Err(CoreError::CounterProtocol { .. })));
    }

    #[test]
    fn gap_limit_enforced() {
        let counter = PartitionUpdateCounter::with_config(CounterConfig::new().max_gaps(2));
        counter.reserve(20);

        counter.apply_completed(3, 1).unwrap();
        counter.apply_completed(6, 1).unwrap();
        let err = counter.apply_completed(9, 1).unwrap_err();
        assert!(matches!(err, CoreError::TooManyGaps { limit: 2, start: 9 }));

        // Merging into an existing gap does not grow the set.
        counter.apply_completed(7, 1).unwrap();
        assert_eq!(counter.gap_count(), 2);
    }

    #[test]
    fn completion_beyond_reserved_raises_high() {
        let counter = PartitionUpdateCounter::new();
        counter.apply_completed(1, 3).unwrap();
        assert_eq!(counter.low(), 3);
        assert_eq!(counter.high(), 3);
    }

    #[test]
    fn snapshot_restore_roundtrip() {
        let counter = PartitionUpdateCounter::new();
        counter.reserve(30);
        counter.apply_completed(1, 5).unwrap();
        counter.apply_completed(10, 5).unwrap();
        counter.apply_completed(20, 2).unwrap();

        let snapshot = counter.snapshot();
        let restored = PartitionUpdateCounter::new();
        restored
            .restore(&CounterSnapshot::decode(&snapshot.encode()).unwrap())
            .unwrap();

        assert_eq!(restored.snapshot(), snapshot);
        assert_eq!(restored.low(), 5);
        assert_eq!(restored.high(), 21);
        assert_eq!(restored.initial(), 5);
    }

    #[test]
    fn restore_normalizes_touching_gaps() {
        let counter = PartitionUpdateCounter::new();
        counter
            .restore(&CounterSnapshot::new(2, vec![(3, 2), (7, 1), (8, 2)]))
            .unwrap();

        assert_eq!(counter.snapshot(), CounterSnapshot::new(4, vec![(7, 3)]));
        assert_eq!(counter.high(), 9);
    }

    #[test]
    fn reset_clears_everything() {
        let counter = PartitionUpdateCounter::new();
        counter.reserve(8);
        counter.apply_completed(5, 1).unwrap();
        counter.reset();

        assert_eq!(counter.low(), 0);
        assert_eq!(counter.high(), 0);
        assert!(counter.is_sequential());
        assert_eq!(counter.reserve(1), 1);
    }

    #[test]
    fn finalize_reports_holes() {
        let counter = PartitionUpdateCounter::new();
        counter.reserve(12);
        counter.apply_completed(1, 2).unwrap();
        counter.apply_completed(5, 2).unwrap();
        counter.apply_completed(10, 1).unwrap();

        let holes = counter.finalize_gaps();
        assert_eq!(holes, vec![(3, 2), (7, 3)]);
        assert_eq!(counter.low(), 10);
        assert!(counter.is_sequential());
    }

    #[test]
    fn update_to_folds_straddling_gap() {
        let counter = PartitionUpdateCounter::new();
        counter.reserve(20);
        counter.apply_completed(4, 2).unwrap();
        counter.apply_completed(8, 4).unwrap();
        counter.apply_completed(15, 1).unwrap();

        counter.update_to(9).unwrap();
        assert_eq!(counter.low(), 11);
        assert_eq!(counter.snapshot().gaps, vec![(15, 1)]);

        assert!(matches!(
            counter.update_to(3),
            Err(CoreError::CounterProtocol { .. })
        ));
    }

    #[derive(Default)]
    struct Recording {
        gaps: AtomicUsize,
        advances: AtomicUsize,
    }

    impl CounterObserver for Recording {
        fn on_gap_recorded(&self, _start: u64, _len: u64, _gap_count: usize) {
            self.gaps.fetch_add(1, Ordering::SeqCst);
        }

        fn on_applied(&self, _from: u64, _to: u64) {
            self.advances.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn observer_sees_events() {
        let observer = Arc::new(Recording::default());
        let counter = PartitionUpdateCounter::new().with_observer(observer.clone());
        counter.reserve(3);
        counter.apply_completed(2, 2).unwrap();
        counter.apply_completed(1, 1).unwrap();

        assert_eq!(observer.gaps.load(Ordering::SeqCst), 1);
        assert_eq!(observer.advances.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_reserve_hands_out_unique_numbers() {
        let counter = PartitionUpdateCounter::new();

        let starts: Vec<u64> = thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| s.spawn(|| (0..1000).map(|_| counter.reserve(1)).collect::<Vec<_>>()))
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        assert_eq!(counter.high(), 2000);
        let unique: HashSet<u64> = starts.iter().copied().collect();
        assert_eq!(unique.len(), 2000);
        assert!(unique.iter().all(|n| (1..=2000).contains(n)));
    }

    #[test]
    fn concurrent_reserve_and_complete_closes_all_gaps() {
        let counter = PartitionUpdateCounter::new();

        thread::scope(|s| {
            for t in 0..4u64 {
                let counter = &counter;
                s.spawn(move || {
                    let mut blocks: Vec<(u64, u64)> = (0..250)
                        .map(|i| {
                            let delta = 1 + (i + t) % 3;
                            (counter.reserve(delta), delta)
                        })
                        .collect();
                    blocks.shuffle(&mut rand::thread_rng());
                    for (start, delta) in blocks {
                        counter.apply_completed(start, delta).unwrap();
                    }
                });
            }
        });

        assert_eq!(counter.low(), counter.high());
        assert!(counter.is_sequential());
    }

    fn reservations() -> impl Strategy<Value = Vec<u64>> {
        prop::collection::vec(1u64..8, 1..40)
    }

    proptest! {
        #[test]
        fn any_completion_order_converges(
            (sizes, order) in reservations().prop_flat_map(|sizes| {
                let n = sizes.len();
                (Just(sizes), Just((0..n).collect::<Vec<_>>()).prop_shuffle())
            })
        ) {
            let counter = PartitionUpdateCounter::new();
            let starts: Vec<u64> = sizes.iter().map(|&d| counter.reserve(d)).collect();

            for &i in &order {
                counter.apply_completed(starts[i], sizes[i]).unwrap();
                prop_assert!(counter.low() <= counter.high());
            }

            prop_assert_eq!(counter.low(), sizes.iter().sum::<u64>());
            prop_assert_eq!(counter.low(), counter.high());
            prop_assert!(counter.is_sequential());
        }

        #[test]
        fn partial_history_snapshot_roundtrips(
            (sizes, order, cut) in reservations().prop_flat_map(|sizes| {
                let n = sizes.len();
                (Just(sizes), Just((0..n).collect::<Vec<_>>()).prop_shuffle(), 0..=n)
            })
        ) {
            let counter = PartitionUpdateCounter::new();
            let starts: Vec<u64> = sizes.iter().map(|&d| counter.reserve(d)).collect();
            for &i in &order[..cut] {
                counter.apply_completed(starts[i], sizes[i]).unwrap();
            }

            let snapshot = counter.snapshot();
            let restored = PartitionUpdateCounter::new();
            restored.restore(&CounterSnapshot::decode(&snapshot.encode()).unwrap()).unwrap();
            prop_assert_eq!(restored.snapshot(), snapshot.clone());
            prop_assert_eq!(restored.low(), counter.low());

            // Finishing the remaining blocks on the restored counter converges too.
            for &i in &order[cut..] {
                restored.apply_completed(starts[i], sizes[i]).unwrap();
            }
            prop_assert_eq!(restored.low(), sizes.iter().sum::<u64>());
            prop_assert!(restored.is_sequential());
        }
    }
}
