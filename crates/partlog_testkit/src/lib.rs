//! # partlog testkit
//!
//! Test utilities for partlog.
//!
//! This crate provides:
//! - Log fixtures on temporary directories and in memory
//! - Crash simulation: torn tails, flipped bytes, writes that die mid-frame
//! - Property-based generators for records and counter histories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use partlog_testkit::prelude::*;
//!
//! #[test]
//! fn survives_torn_tail() {
//!     let log = TestLog::file();
//!     log.append(&data_record(1, 0, 1, b"a")).unwrap();
//!     let index = log.current_segment();
//!     let log = log.reopen_after(|dir| truncate_tail(dir, index, 3).map(|_| ()));
//!     // ... replay and check
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::crash::{
        append_garbage, flip_byte, truncate_tail, CrashableBackend, CrashingDirectory,
    };
    pub use crate::fixtures::{
        collect_replay, data_record, init_tracing, memory_log, page_update_ref, TestLog,
    };
    pub use crate::generators::{
        completion_order_strategy, record_strategy, records_strategy, snapshot_strategy,
    };
    pub use partlog_core::{
        CoreError, CoreResult, CounterSnapshot, GroupId, LogPointer, PageId, PartitionId,
        PartitionUpdateCounter, WalConfig, WalManager, WalRecord,
    };
}
