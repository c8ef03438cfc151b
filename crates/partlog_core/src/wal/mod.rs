//! Segmented write-ahead log.
//!
//! The log is an ordered sequence of append-only segments. Every segment
//! opens with a header frame declaring the record format used for the rest
//! of it, so older segments stay readable after a format upgrade.
//!
//! ## Segment Layout
//!
//! ```text
//! | header frame | frame | frame | ... | zero padding (optional) |
//! ```
//!
//! ## Frame Format
//!
//! ```text
//! | type (1) | length (4) | payload (length) | crc32 (4, format >= 2) |
//! ```
//!
//! ## Replay Policy
//!
//! ### Tolerated (treated as end of data)
//!
//! - Zero padding after the last record of any segment
//! - A truncated, checksum-failing or undecodable record in the newest
//!   segment of the replay range: the tail a crash left mid-write
//!
//! ### Fatal (the session fails)
//!
//! - The same damage in any older segment of the range
//! - A missing, damaged or unsupported segment header
//! - A segment missing from the requested range
//!
//! ## Invariants
//!
//! - Replay yields records in strictly increasing [`LogPointer`] order
//! - Opening a session at a returned pointer and skipping one record
//!   resumes right after it
//! - A segment is listed only once its header has been written
//! - Pinned segments are never released
//!
//! [`LogPointer`]: crate::LogPointer

mod codec;
mod directory;
mod pins;
mod record;
mod replay;
mod segment;
mod writer;

pub use codec::{
    decode_header, encode_header, serializer_for_version, RecordSerializer, V1Serializer,
    V2Serializer, CRC_SIZE, CURRENT_FORMAT_VERSION, FRAME_PREFIX_SIZE, HEADER_FRAME_SIZE,
    MIN_FORMAT_VERSION,
};
pub use directory::{InMemorySegmentDirectory, SegmentDirectory};
pub use pins::{SegmentPin, SegmentPins};
pub use record::{PartitionState, WalRecord, WalRecordType, SEGMENT_MAGIC};
pub use replay::{LogReplay, ReplayState};
pub use writer::WalManager;

pub(crate) use writer::{fill_reference, read_record_in};
