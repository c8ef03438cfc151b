//! Crash recovery: replay the log into a page store and rebuild counters.
//!
//! Recovery walks the log from a start pointer to the head. Checkpoint
//! records reseed partition counters, data records complete their update
//! numbers, and page records are forwarded to the page store with their
//! referenced payloads resolved.

use crate::config::CounterConfig;
use crate::counter::{CounterSnapshot, PartitionUpdateCounter};
use crate::error::CoreResult;
use crate::pointer::LogPointer;
use crate::types::{GroupId, PartitionId};
use crate::wal::{fill_reference, read_record_in, LogReplay, SegmentDirectory, WalRecord};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Receives replayed mutations.
pub trait PageStore {
    /// Applies one replayed record.
    ///
    /// Headers and checkpoints are never passed in. Page updates arrive with
    /// their payload resolved.
    ///
    /// # Errors
    ///
    /// Errors abort recovery and are returned from [`Recovery::run`].
    fn apply_record(&mut self, ptr: LogPointer, record: &WalRecord) -> CoreResult<()>;
}

/// Partition key used by recovery.
pub type PartitionKey = (GroupId, PartitionId);

/// Result of a recovery run.
#[derive(Debug, Default)]
pub struct RecoveryOutcome {
    /// Records forwarded to the page store.
    pub records_applied: u64,
    /// Pointer of the last record read.
    pub last_pointer: Option<LogPointer>,
    /// Identifier of the newest checkpoint seen.
    pub last_checkpoint: Option<u64>,
    /// Rebuilt counters of every partition seen or seeded.
    pub counters: BTreeMap<PartitionKey, PartitionUpdateCounter>,
}

impl RecoveryOutcome {
    /// Partitions whose counters still have holes after replay.
    #[must_use]
    pub fn partitions_with_gaps(&self) -> Vec<PartitionKey> {
        self.counters
            .iter()
            .filter(|(_, c)| !c.is_sequential())
            .map(|(k, _)| *k)
            .collect()
    }
}

/// Recovery driver.
///
/// # Example
///
/// ```rust,ignore
/// let outcome = Recovery::new(dir)
///     .from_pointer(checkpoint_ptr)
///     .run(&mut store)?;
/// for key in outcome.partitions_with_gaps() {
///     // schedule rebalancing
/// }
/// ```
pub struct Recovery {
    dir: Arc<dyn SegmentDirectory>,
    start: Option<LogPointer>,
    counter_config: CounterConfig,
    seeds: BTreeMap<PartitionKey, CounterSnapshot>,
    read_buffer_size: usize,
}

impl Recovery {
    /// Creates a recovery over the whole log in `dir`.
    #[must_use]
    pub fn new(dir: Arc<dyn SegmentDirectory>) -> Self {
        Self {
            dir,
            start: None,
            counter_config: CounterConfig::default(),
            seeds: BTreeMap::new(),
            read_buffer_size: 64 * 1024,
        }
    }

    /// Starts replay at `ptr` instead of the oldest segment.
    #[must_use]
    pub fn from_pointer(mut self, ptr: LogPointer) -> Self {
        self.start = Some(ptr);
        self
    }

    /// Sets the configuration of rebuilt counters.
    #[must_use]
    pub fn counter_config(mut self, config: CounterConfig) -> Self {
        self.counter_config = config;
        self
    }

    /// Seeds a partition counter from persisted state.
    #[must_use]
    pub fn seed(mut self, key: PartitionKey, snapshot: CounterSnapshot) -> Self {
        self.seeds.insert(key, snapshot);
        self
    }

    fn counter<'a>(
        &self,
        counters: &'a mut BTreeMap<PartitionKey, PartitionUpdateCounter>,
        key: PartitionKey,
    ) -> &'a PartitionUpdateCounter {
        counters
            .entry(key)
            .or_insert_with(|| PartitionUpdateCounter::with_config(self.counter_config.clone()))
    }

    /// Replays the log into `store`.
    ///
    /// # Errors
    ///
    /// Returns replay errors (missing segments, corruption outside the newest
    /// segment, header errors, I/O), counter protocol errors, and errors from
    /// the page store.
    pub fn run<S: PageStore + ?Sized>(self, store: &mut S) -> CoreResult<RecoveryOutcome> {
        let mut outcome = RecoveryOutcome::default();
        // Last persisted state per partition; its gaps are confirmed, not
        // completed again, when the log replays them.
        let mut persisted = self.seeds.clone();
        for (key, snapshot) in &self.seeds {
            self.counter(&mut outcome.counters, *key).restore(snapshot)?;
        }

        let replay = LogReplay::open(Arc::clone(&self.dir), self.start)?;
        info!(
            start = %self.start.map_or_else(|| "oldest".to_string(), |p| p.to_string()),
            segments = replay.segments().len(),
            "starting recovery"
        );

        for item in replay {
            let (ptr, mut record) = item?;
            outcome.last_pointer = Some(ptr);

            if record.needs_payload() {
                fill_reference(&mut record, |at| {
                    read_record_in(self.dir.as_ref(), None, self.read_buffer_size, at)
                })?;
            }

            match &record {
                WalRecord::Header { .. } => continue,
                WalRecord::Checkpoint { id, partitions } => {
                    for state in partitions {
                        let key = (state.group_id, state.partition);
                        self.counter(&mut outcome.counters, key)
                            .restore(&state.counter)?;
                        persisted.insert(key, state.counter.clone());
                    }
                    debug!(checkpoint = id, partitions = partitions.len(), %ptr, "restored checkpoint");
                    outcome.last_checkpoint = Some(*id);
                    continue;
                }
                WalRecord::Data {
                    group_id,
                    partition,
                    counter: update,
                    ..
                } => {
                    let key = (*group_id, *partition);
                    let counter = self.counter(&mut outcome.counters, key);
                    let confirms_gap = persisted
                        .get(&key)
                        .is_some_and(|snapshot| snapshot.in_gap(*update))
                        && counter.is_completed(*update);
                    if confirms_gap {
                        debug!(update, %ptr, "log confirms persisted counter gap");
                    } else {
                        counter.apply_completed(*update, 1)?;
                    }
                }
                WalRecord::PageInsert { .. }
                | WalRecord::PageUpdate { .. }
                | WalRecord::PageRemove { .. } => {}
            }

            store.apply_record(ptr, &record)?;
            outcome.records_applied += 1;
        }

        info!(
            records = outcome.records_applied,
            partitions = outcome.counters.len(),
            checkpoint = ?outcome.last_checkpoint,
            "recovery finished"
        );
        Ok(outcome)
    }
}
