//! Choice between historical (log replay) and full rebalancing.
//!
//! A supplier can stream a partition's history from the log only when the
//! partition's counter has no more holes than the policy tolerates and
//! every segment from the requested pointer to the head still exists.
//! Anything else falls back to a full copy, which is always valid.

use crate::counter::PartitionUpdateCounter;
use crate::error::{CoreError, CoreResult};
use crate::pointer::LogPointer;
use crate::wal::{LogReplay, SegmentPin, WalManager};
use std::fmt;
use tracing::{debug, info};

/// Why historical rebalancing was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FullRebalanceReason {
    /// The demander has no log position to resume from.
    NoHistory,
    /// The counter has more gaps than the policy tolerates.
    TooManyGaps {
        /// Gaps recorded by the counter.
        gaps: usize,
        /// Policy limit.
        limit: usize,
    },
    /// A segment the history needs has been released.
    SegmentMissing {
        /// Index of the missing segment.
        index: u64,
    },
    /// A segment of the history has an unreadable header.
    UnreadableHistory {
        /// Description of the problem.
        message: String,
    },
}

impl fmt::Display for FullRebalanceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoHistory => write!(f, "no log position to resume from"),
            Self::TooManyGaps { gaps, limit } => {
                write!(f, "{gaps} counter gaps exceed limit {limit}")
            }
            Self::SegmentMissing { index } => write!(f, "segment {index} is missing"),
            Self::UnreadableHistory { message } => write!(f, "unreadable history: {message}"),
        }
    }
}

/// How a partition will be rebalanced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebalanceMode {
    /// Replay the log from `from`.
    Historical {
        /// First record to send.
        from: LogPointer,
    },
    /// Copy the whole partition.
    Full {
        /// Why history could not be used.
        reason: FullRebalanceReason,
    },
}

impl RebalanceMode {
    /// Returns true for [`RebalanceMode::Historical`].
    #[must_use]
    pub fn is_historical(&self) -> bool {
        matches!(self, Self::Historical { .. })
    }
}

/// A historical rebalance that is ready to stream.
///
/// Holds a pin on the starting segment so the history cannot be released
/// while the session runs.
#[derive(Debug)]
pub struct HistoricalSupply {
    /// Replay session positioned at the requested pointer.
    pub replay: LogReplay,
    _pin: SegmentPin,
}

/// Outcome of [`HistoryPolicy::open_history`].
#[derive(Debug)]
pub enum HistorySupply {
    /// Stream records from the log.
    Historical(HistoricalSupply),
    /// Fall back to a full copy.
    Full(FullRebalanceReason),
}

/// Decides when log history is good enough for rebalancing.
#[derive(Debug, Clone)]
pub struct HistoryPolicy {
    /// Counter gaps tolerated for historical rebalancing.
    pub max_gaps: usize,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self { max_gaps: 0 }
    }
}

impl HistoryPolicy {
    /// Creates a policy that requires sequential counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of tolerated counter gaps.
    #[must_use]
    pub const fn max_gaps(mut self, value: usize) -> Self {
        self.max_gaps = value;
        self
    }

    /// Chooses the rebalance mode for a partition.
    ///
    /// # Errors
    ///
    /// Returns an error only if the segment directory cannot be listed.
    pub fn decide(
        &self,
        counter: &PartitionUpdateCounter,
        wal: &WalManager,
        from: Option<LogPointer>,
    ) -> CoreResult<RebalanceMode> {
        let Some(from) = from else {
            return Ok(self.full(FullRebalanceReason::NoHistory));
        };

        let gaps = counter.gap_count();
        if gaps > self.max_gaps {
            return Ok(self.full(FullRebalanceReason::TooManyGaps {
                gaps,
                limit: self.max_gaps,
            }));
        }

        let segments = wal.segments()?;
        let head = wal.current_segment();
        let mut expected = from.index();
        for index in segments.into_iter().filter(|&i| i >= from.index()) {
            if index != expected {
                break;
            }
            expected += 1;
        }
        if expected <= head {
            return Ok(self.full(FullRebalanceReason::SegmentMissing { index: expected }));
        }

        debug!(%from, gaps, "historical rebalance possible");
        Ok(RebalanceMode::Historical { from })
    }

    /// Decides and, for history, opens the replay session.
    ///
    /// Segments vanishing between the decision and the open, or headers
    /// that cannot be read, also fall back to a full rebalance.
    ///
    /// # Errors
    ///
    /// Returns I/O errors and corruption errors other than those above.
    pub fn open_history(
        &self,
        counter: &PartitionUpdateCounter,
        wal: &WalManager,
        from: Option<LogPointer>,
    ) -> CoreResult<HistorySupply> {
        let from = match self.decide(counter, wal, from)? {
            RebalanceMode::Historical { from } => from,
            RebalanceMode::Full { reason } => return Ok(HistorySupply::Full(reason)),
        };

        let opened = wal.pin(from.index()).and_then(|pin| {
            let replay = wal.replay(Some(from))?;
            Ok(HistoricalSupply { replay, _pin: pin })
        });

        match opened {
            Ok(supply) => Ok(HistorySupply::Historical(supply)),
            Err(CoreError::SegmentMissing { index }) => Ok(HistorySupply::Full(fall_back(
                FullRebalanceReason::SegmentMissing { index },
            ))),
            Err(
                e @ (CoreError::HeaderCorruption { .. } | CoreError::UnsupportedVersion { .. }),
            ) => Ok(HistorySupply::Full(fall_back(
                FullRebalanceReason::UnreadableHistory {
                    message: e.to_string(),
                },
            ))),
            Err(e) => Err(e),
        }
    }

    fn full(&self, reason: FullRebalanceReason) -> RebalanceMode {
        RebalanceMode::Full {
            reason: fall_back(reason),
        }
    }
}

fn fall_back(reason: FullRebalanceReason) -> FullRebalanceReason {
    info!(%reason, "falling back to full rebalance");
    reason
}
