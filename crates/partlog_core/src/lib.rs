//! # partlog core
//!
//! Durability core of a partitioned storage engine.
//!
//! This crate provides:
//! - A segmented write-ahead log with versioned, checksummed record frames
//! - Replay sessions that walk segments in pointer order and tell a torn
//!   tail from real corruption
//! - Per-partition update counters that track out-of-order completion
//! - The rebalance policy choosing between log history and a full copy
//! - A recovery driver feeding replayed records to a page store
//!
//! ## Example
//!
//! ```rust
//! use partlog_core::{
//!     GroupId, InMemorySegmentDirectory, PartitionId, PartitionUpdateCounter, WalConfig,
//!     WalManager, WalRecord,
//! };
//! use std::sync::Arc;
//!
//! let wal = WalManager::open(Arc::new(InMemorySegmentDirectory::new()), WalConfig::default())?;
//! let counter = PartitionUpdateCounter::new();
//!
//! let update = counter.reserve(1);
//! let ptr = wal.append(&WalRecord::Data {
//!     group_id: GroupId::new(1),
//!     partition: PartitionId::new(0),
//!     counter: update,
//!     payload: b"value".to_vec(),
//! })?;
//! wal.flush()?;
//! counter.apply_completed(update, 1)?;
//!
//! let replayed: Vec<_> = wal.replay(None)?.collect::<Result<_, _>>()?;
//! assert_eq!(replayed[0].0, ptr);
//! assert!(counter.is_sequential());
//! # Ok::<(), partlog_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod counter;
mod dir;
mod error;
mod pointer;
mod rebalance;
mod recovery;
mod stats;
mod types;
pub mod wal;

pub use config::{CounterConfig, WalConfig};
pub use counter::{CounterObserver, CounterSnapshot, PartitionUpdateCounter};
pub use dir::FsSegmentDirectory;
pub use error::{CoreError, CoreResult};
pub use pointer::{LogPointer, MAX_POINTER_OFFSET, POINTER_SIZE};
pub use rebalance::{
    FullRebalanceReason, HistoricalSupply, HistoryPolicy, HistorySupply, RebalanceMode,
};
pub use recovery::{PageStore, PartitionKey, Recovery, RecoveryOutcome};
pub use stats::{WalStats, WalStatsSnapshot};
pub use types::{GroupId, PageId, PartitionId};
pub use wal::{
    InMemorySegmentDirectory, LogReplay, PartitionState, ReplayState, SegmentDirectory,
    SegmentPin, SegmentPins, WalManager, WalRecord, WalRecordType,
};
