//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random log records and counter
//! histories that maintain the invariants the log and counters require.

use partlog_core::{
    CounterSnapshot, GroupId, LogPointer, PageId, PartitionId, PartitionState, WalRecord,
};
use proptest::prelude::*;

/// Strategy for record payloads.
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// Strategy for pointers that could appear as page update references.
pub fn pointer_strategy() -> impl Strategy<Value = LogPointer> {
    (0u64..64, 15u32..1_000_000, 1u32..4096)
        .prop_map(|(index, offset, length)| LogPointer::with_length(index, offset, length))
}

/// Strategy for valid counter snapshots.
///
/// Every gap leaves at least one missing update number below it.
pub fn snapshot_strategy() -> impl Strategy<Value = CounterSnapshot> {
    (
        0u64..1_000,
        prop::collection::vec((1u64..10, 1u64..10), 0..6),
    )
        .prop_map(|(applied, shape)| {
            let mut floor = applied;
            let mut gaps = Vec::with_capacity(shape.len());
            for (missing, len) in shape {
                let start = floor + 1 + missing;
                gaps.push((start, len));
                floor = start + len - 1;
            }
            CounterSnapshot::new(applied, gaps)
        })
}

/// Strategy for any record a writer may append (no headers).
pub fn record_strategy() -> impl Strategy<Value = WalRecord> {
    let group = (0u32..4).prop_map(GroupId::new);
    let partition = (0u16..8).prop_map(PartitionId::new);
    let page = any::<u64>().prop_map(PageId::new);

    prop_oneof![
        (group.clone(), partition.clone(), 1u64..1_000_000, payload_strategy()).prop_map(
            |(group_id, partition, counter, payload)| WalRecord::Data {
                group_id,
                partition,
                counter,
                payload,
            }
        ),
        (group.clone(), page.clone(), payload_strategy()).prop_map(
            |(group_id, page_id, payload)| WalRecord::PageInsert {
                group_id,
                page_id,
                payload,
            }
        ),
        (group.clone(), page.clone(), any::<u16>(), payload_strategy()).prop_map(
            |(group_id, page_id, item_id, payload)| WalRecord::PageUpdate {
                group_id,
                page_id,
                item_id,
                payload_size: payload.len() as u32,
                reference: None,
                payload,
            }
        ),
        (group.clone(), page.clone(), any::<u16>(), any::<u32>(), pointer_strategy()).prop_map(
            |(group_id, page_id, item_id, payload_size, reference)| WalRecord::PageUpdate {
                group_id,
                page_id,
                item_id,
                payload_size,
                reference: Some(reference),
                payload: Vec::new(),
            }
        ),
        (group.clone(), page, any::<u16>()).prop_map(|(group_id, page_id, item_id)| {
            WalRecord::PageRemove {
                group_id,
                page_id,
                item_id,
            }
        }),
        (
            any::<u64>(),
            prop::collection::vec((group, partition, snapshot_strategy()), 0..4)
        )
            .prop_map(|(id, states)| WalRecord::Checkpoint {
                id,
                partitions: states
                    .into_iter()
                    .map(|(group_id, partition, counter)| PartitionState {
                        group_id,
                        partition,
                        counter,
                    })
                    .collect(),
            }),
    ]
}

/// Strategy for a batch of appendable records.
pub fn records_strategy(max: usize) -> impl Strategy<Value = Vec<WalRecord>> {
    prop::collection::vec(record_strategy(), 1..=max.max(1))
}

/// Strategy for a completion history of a partition counter.
///
/// Produces up to `max_blocks` blocks `(start, delta)` that tile
/// `1..=total` exactly, in shuffled completion order.
pub fn completion_order_strategy(max_blocks: usize) -> impl Strategy<Value = Vec<(u64, u64)>> {
    prop::collection::vec(1u64..=4, 1..=max_blocks.max(1))
        .prop_map(|sizes| {
            let mut next = 1;
            sizes
                .into_iter()
                .map(|delta| {
                    let block = (next, delta);
                    next += delta;
                    block
                })
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

#[cfg(test)]
mod tests {
    use super::*;
    use partlog_core::PartitionUpdateCounter;

    proptest! {
        #[test]
        fn generated_snapshots_are_valid(snapshot in snapshot_strategy()) {
            prop_assert!(snapshot.validate().is_ok());
            prop_assert_eq!(CounterSnapshot::decode(&snapshot.encode()).unwrap(), snapshot);
        }

        #[test]
        fn completion_blocks_tile_the_range(blocks in completion_order_strategy(20)) {
            let mut sorted = blocks.clone();
            sorted.sort_unstable();
            let mut next = 1;
            for (start, delta) in sorted {
                prop_assert_eq!(start, next);
                next += delta;
            }

            let counter = PartitionUpdateCounter::new();
            counter.reserve(next - 1);
            for (start, delta) in blocks {
                prop_assert!(counter.apply_completed(start, delta).unwrap());
            }
            prop_assert_eq!(counter.low(), next - 1);
            prop_assert!(counter.is_sequential());
        }
    }
}
