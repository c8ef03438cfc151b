//! Persistable form of a partition update counter.
//!
//! ## Format
//!
//! ```text
//! | applied (8) | gap_count (4) | { start (8) | len (8) } * gap_count |
//! ```
//!
//! All integers are little-endian. A gap `(start, len)` covers the update
//! numbers `start..start + len` that completed while some lower number was
//! still outstanding.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

const HEADER_SIZE: usize = 12;
const GAP_SIZE: usize = 16;

/// Applied low-water-mark plus the ordered list of completed-out-of-order ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    /// Highest N such that updates `1..=N` are all complete.
    pub applied: u64,
    /// Completed ranges above `applied`, as `(start, len)` ordered by start.
    pub gaps: Vec<(u64, u64)>,
}

impl CounterSnapshot {
    /// Creates a snapshot.
    #[must_use]
    pub fn new(applied: u64, gaps: Vec<(u64, u64)>) -> Self {
        Self { applied, gaps }
    }

    /// Returns true if there are no out-of-order ranges.
    #[must_use]
    pub fn is_sequential(&self) -> bool {
        self.gaps.is_empty()
    }

    /// Highest update number known complete, gaps included.
    #[must_use]
    pub fn highest_completed(&self) -> u64 {
        self.gaps
            .last()
            .map_or(self.applied, |&(start, len)| start + len - 1)
    }

    /// Returns true if update `n` lies inside one of the gaps.
    #[must_use]
    pub fn in_gap(&self, n: u64) -> bool {
        self.gaps
            .iter()
            .any(|&(start, len)| n >= start && n - start < len)
    }

    /// Checks ordering and disjointness of the gap list.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if a gap is empty, starts at or below
    /// `applied`, overflows, or overlaps/precedes the previous gap.
    pub fn validate(&self) -> CoreResult<()> {
        let mut floor = self.applied;
        for &(start, len) in &self.gaps {
            if len == 0 {
                return Err(CoreError::invalid_format(format!(
                    "empty gap at {start}"
                )));
            }
            if start <= floor {
                return Err(CoreError::invalid_format(format!(
                    "gap at {start} overlaps or precedes {floor}"
                )));
            }
            floor = start.checked_add(len - 1).ok_or_else(|| {
                CoreError::invalid_format(format!("gap ({start}, {len}) overflows"))
            })?;
        }
        Ok(())
    }

    /// Encodes the snapshot into its persisted byte form.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.gaps.len() * GAP_SIZE);
        buf.extend_from_slice(&self.applied.to_le_bytes());
        buf.extend_from_slice(&(self.gaps.len() as u32).to_le_bytes());
        for &(start, len) in &self.gaps {
            buf.extend_from_slice(&start.to_le_bytes());
            buf.extend_from_slice(&len.to_le_bytes());
        }
        buf
    }

    /// Decodes a snapshot and validates it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` on short input, trailing bytes or an
    /// inconsistent gap list.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(CoreError::invalid_format(format!(
                "counter snapshot too short: {} bytes",
                data.len()
            )));
        }

        let applied = read_u64(data, 0)?;
        let count = u32::from_le_bytes(
            data[8..12]
                .try_into()
                .map_err(|_| CoreError::invalid_format("invalid gap count"))?,
        ) as usize;

        let expected = HEADER_SIZE + count * GAP_SIZE;
        if data.len() != expected {
            return Err(CoreError::invalid_format(format!(
                "counter snapshot with {count} gaps must be {expected} bytes, got {}",
                data.len()
            )));
        }

        let mut gaps = Vec::with_capacity(count);
        for i in 0..count {
            let at = HEADER_SIZE + i * GAP_SIZE;
            gaps.push((read_u64(data, at)?, read_u64(data, at + 8)?));
        }

        let snapshot = Self { applied, gaps };
        snapshot.validate()?;
        Ok(snapshot)
    }
}

fn read_u64(data: &[u8], at: usize) -> CoreResult<u64> {
    let bytes: [u8; 8] = data
        .get(at..at + 8)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| CoreError::invalid_format("unexpected end of counter snapshot"))?;
    Ok(u64::from_le_bytes(bytes))
}
