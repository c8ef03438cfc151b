//! Benchmark utilities.

use partlog_core::{GroupId, PartitionId, WalRecord};
use rand::seq::SliceRandom;
use rand::Rng;

/// Generate random payload bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` data records with consecutive update numbers.
pub fn data_records(count: usize, payload_size: usize) -> Vec<WalRecord> {
    (0..count as u64)
        .map(|i| WalRecord::Data {
            group_id: GroupId::new(1),
            partition: PartitionId::new((i % 16) as u16),
            counter: i + 1,
            payload: random_data(payload_size),
        })
        .collect()
}

/// Update numbers `1..=count` in random completion order.
pub fn shuffled_updates(count: u64) -> Vec<u64> {
    let mut updates: Vec<u64> = (1..=count).collect();
    updates.shuffle(&mut rand::thread_rng());
    updates
}
