//! Log pointers: the coordinate of a record within the segmented log.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Size of the external pointer representation.
pub const POINTER_SIZE: usize = 16;

/// Largest offset or length the external representation can carry.
pub const MAX_POINTER_OFFSET: u32 = i32::MAX as u32;

/// Position of a record in the log: segment index, byte offset and length.
///
/// Pointers are compared, hashed and ordered by `(index, offset)` only. The
/// length is back-filled once the record has been read completely, so a
/// pointer taken before the read equals the pointer handed out after it.
///
/// The external form used by rebalancers and recovery coordinators as an
/// opaque cursor is `(index: i64, offset: i32, length: i32)`, little-endian.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LogPointer {
    index: u64,
    offset: u32,
    length: u32,
}

impl LogPointer {
    /// Creates a pointer whose length is not known yet.
    #[must_use]
    pub const fn new(index: u64, offset: u32) -> Self {
        Self {
            index,
            offset,
            length: 0,
        }
    }

    /// Creates a pointer with a known record length.
    #[must_use]
    pub const fn with_length(index: u64, offset: u32, length: u32) -> Self {
        Self {
            index,
            offset,
            length,
        }
    }

    /// Segment index.
    #[must_use]
    pub const fn index(&self) -> u64 {
        self.index
    }

    /// Byte offset of the record within its segment.
    #[must_use]
    pub const fn offset(&self) -> u32 {
        self.offset
    }

    /// Length of the record frame in bytes, 0 if not yet known.
    #[must_use]
    pub const fn length(&self) -> u32 {
        self.length
    }

    /// Offset just past the record in the same segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the length is still unknown.
    pub fn end_offset(&self) -> CoreResult<u32> {
        if self.length == 0 {
            return Err(CoreError::invalid_argument(format!(
                "pointer {self} has no record length"
            )));
        }
        self.offset
            .checked_add(self.length)
            .ok_or_else(|| CoreError::invalid_argument("pointer end overflows"))
    }

    /// Pointer to the position right after this record.
    ///
    /// # Errors
    ///
    /// Returns an error if the length is still unknown.
    pub fn next(&self) -> CoreResult<Self> {
        Ok(Self::new(self.index, self.end_offset()?))
    }

    /// Encodes the external `(i64, i32, i32)` representation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if a field does not fit its signed slot.
    pub fn to_bytes(&self) -> CoreResult<[u8; POINTER_SIZE]> {
        let (Ok(index), Ok(offset), Ok(length)) = (
            i64::try_from(self.index),
            i32::try_from(self.offset),
            i32::try_from(self.length),
        ) else {
            return Err(CoreError::invalid_argument(format!(
                "pointer {self} does not fit the external form"
            )));
        };

        let mut buf = [0u8; POINTER_SIZE];
        buf[0..8].copy_from_slice(&index.to_le_bytes());
        buf[8..12].copy_from_slice(&offset.to_le_bytes());
        buf[12..16].copy_from_slice(&length.to_le_bytes());
        Ok(buf)
    }

    /// Decodes the external representation.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is too short or any field is negative.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() < POINTER_SIZE {
            return Err(CoreError::invalid_format(format!(
                "log pointer needs {POINTER_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let index = i64::from_le_bytes(bytes[0..8].try_into().map_err(|_| {
            CoreError::invalid_format("invalid pointer index")
        })?);
        let offset = i32::from_le_bytes(bytes[8..12].try_into().map_err(|_| {
            CoreError::invalid_format("invalid pointer offset")
        })?);
        let length = i32::from_le_bytes(bytes[12..16].try_into().map_err(|_| {
            CoreError::invalid_format("invalid pointer length")
        })?);

        if index < 0 || offset < 0 || length < 0 {
            return Err(CoreError::invalid_format(format!(
                "negative log pointer field: ({index}, {offset}, {length})"
            )));
        }

        Ok(Self::with_length(index as u64, offset as u32, length as u32))
    }
}

impl PartialEq for LogPointer {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.offset == other.offset
    }
}

impl Eq for LogPointer {}

impl Hash for LogPointer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.offset.hash(state);
    }
}

impl PartialOrd for LogPointer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LogPointer {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.index, self.offset).cmp(&(other.index, other.offset))
    }
}

impl fmt::Display for LogPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ptr({}:{}+{})", self.index, self.offset, self.length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn equality_ignores_length() {
        let before = LogPointer::new(2, 100);
        let after = LogPointer::with_length(2, 100, 37);
        assert_eq!(before, after);

        let mut set = HashSet::new();
        set.insert(before);
        assert!(set.contains(&after));
    }

    #[test]
    fn ordering_is_lexicographic() {
        assert!(LogPointer::new(1, 900) < LogPointer::new(2, 10));
        assert!(LogPointer::new(2, 10) < LogPointer::new(2, 11));
    }

    #[test]
    fn external_form_roundtrip() {
        let ptr = LogPointer::with_length(7, 4096, 120);
        let decoded = LogPointer::from_bytes(&ptr.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, ptr);
        assert_eq!(decoded.length(), 120);
    }

    #[test]
    fn negative_external_fields_rejected() {
        let mut bytes = LogPointer::new(1, 1).to_bytes().unwrap();
        bytes[0..8].copy_from_slice(&(-1i64).to_le_bytes());
        assert!(matches!(
            LogPointer::from_bytes(&bytes),
            Err(CoreError::InvalidFormat { .. })
        ));
        assert!(LogPointer::from_bytes(&bytes[..10]).is_err());
    }

    #[test]
    fn unsigned_overflow_rejected_on_encode() {
        let far = LogPointer::with_length(0, MAX_POINTER_OFFSET + 0x11, 32);
        assert!(matches!(far.to_bytes(), Err(CoreError::InvalidArgument { .. })));
        assert!(LogPointer::with_length(0, 12, u32::MAX).to_bytes().is_err());
        assert!(LogPointer::new(u64::MAX, 12).to_bytes().is_err());

        let edge = LogPointer::with_length(0, MAX_POINTER_OFFSET, 0);
        assert_eq!(LogPointer::from_bytes(&edge.to_bytes().unwrap()).unwrap(), edge);
    }

    #[test]
    fn next_requires_length() {
        assert!(LogPointer::new(0, 12).next().is_err());
        let next = LogPointer::with_length(0, 12, 30).next().unwrap();
        assert_eq!(next, LogPointer::new(0, 42));
    }

    #[test]
    fn serde_json_roundtrip() {
        let ptr = LogPointer::with_length(3, 64, 9);
        let json = serde_json::to_string(&ptr).unwrap();
        let back: LogPointer = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ptr);
        assert_eq!(back.length(), 9);
    }
}
