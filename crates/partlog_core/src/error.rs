//! Error types for partlog core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in partlog core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] partlog_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A segment needed by a replay session has been archived or removed.
    #[error("log segment {index} is missing")]
    SegmentMissing {
        /// Index of the missing segment.
        index: u64,
    },

    /// The first record of a segment is not a valid header.
    #[error("segment {segment} header corrupted: {message}")]
    HeaderCorruption {
        /// Segment index.
        segment: u64,
        /// Description of the problem.
        message: String,
    },

    /// The segment header declares a record format this build cannot read.
    #[error("segment {segment} uses unsupported record format version {version}")]
    UnsupportedVersion {
        /// Segment index.
        segment: u64,
        /// Declared format version.
        version: u16,
    },

    /// A record inside a segment is structurally invalid.
    #[error("WAL corruption in segment {segment} at offset {offset}: {message}")]
    WalCorruption {
        /// Segment index.
        segment: u64,
        /// Byte offset of the record within the segment.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected.
    #[error(
        "checksum mismatch in segment {segment} at offset {offset}: expected {expected:08x}, got {actual:08x}"
    )]
    ChecksumMismatch {
        /// Segment index.
        segment: u64,
        /// Byte offset of the record within the segment.
        offset: u64,
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// A caller reported an inconsistent completion to a partition counter.
    #[error("update counter protocol violation: {message}")]
    CounterProtocol {
        /// Description of the violation.
        message: String,
    },

    /// The gap set of a partition counter reached its configured limit.
    #[error("too many gaps in update counter (limit {limit}) while recording range starting at {start}")]
    TooManyGaps {
        /// Configured limit.
        limit: usize,
        /// First update number of the range that could not be recorded.
        start: u64,
    },

    /// A segment cannot be removed while readers hold it.
    #[error("log segment {index} is in use by a reader")]
    SegmentInUse {
        /// Index of the pinned segment.
        index: u64,
    },

    /// Invalid persisted format (counter snapshot, pointer bytes).
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Invalid argument passed to an operation.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// Another process holds the log directory lock.
    #[error("log directory locked: another process has exclusive access")]
    DirectoryLocked,
}

impl CoreError {
    /// Creates a header corruption error.
    pub fn header_corruption(segment: u64, message: impl Into<String>) -> Self {
        Self::HeaderCorruption {
            segment,
            message: message.into(),
        }
    }

    /// Creates a WAL corruption error.
    pub fn wal_corruption(segment: u64, offset: u64, message: impl Into<String>) -> Self {
        Self::WalCorruption {
            segment,
            offset,
            message: message.into(),
        }
    }

    /// Creates a counter protocol error.
    pub fn counter_protocol(message: impl Into<String>) -> Self {
        Self::CounterProtocol {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Returns true for errors describing damaged record bytes.
    ///
    /// These are the errors the replay engine may downgrade to a clean end of
    /// data when they occur in the newest segment of a replay range.
    #[must_use]
    pub fn is_record_corruption(&self) -> bool {
        matches!(
            self,
            Self::WalCorruption { .. } | Self::ChecksumMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corruption_errors_carry_position() {
        let err = CoreError::wal_corruption(3, 4096, "bad frame");
        assert_eq!(
            err.to_string(),
            "WAL corruption in segment 3 at offset 4096: bad frame"
        );
        assert!(err.is_record_corruption());
    }

    #[test]
    fn header_errors_are_not_record_corruption() {
        assert!(!CoreError::header_corruption(0, "missing").is_record_corruption());
        assert!(!CoreError::SegmentMissing { index: 1 }.is_record_corruption());
    }
}
