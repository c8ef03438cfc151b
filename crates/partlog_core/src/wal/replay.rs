//! Multi-segment replay sessions.
//!
//! A [`LogReplay`] walks a contiguous range of segments and yields every
//! record in pointer order. Only the newest segment of the range may end in
//! a damaged record; the same damage anywhere else fails the session.

use crate::error::{CoreError, CoreResult};
use crate::pointer::LogPointer;
use crate::stats::WalStats;
use crate::wal::directory::SegmentDirectory;
use crate::wal::pins::SegmentPins;
use crate::wal::record::WalRecord;
use crate::wal::segment::{ReadOutcome, SegmentReader};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default reader buffer for sessions opened without a writer.
const DEFAULT_READ_BUFFER: usize = 64 * 1024;

/// Where a replay session stands between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    /// A segment is open and the next record can be read.
    Positioned,
    /// Reading the next record of the current segment.
    Advancing,
    /// The current segment is done and the next one is being opened.
    SwitchingSegment,
    /// No more records will be produced.
    Exhausted,
}

/// A replay session over the log.
///
/// Each session pins the segment it is reading, so the segment cannot be
/// released underneath it. Dropping or [`close`](Self::close)-ing the
/// session releases the pin.
pub struct LogReplay {
    dir: Arc<dyn SegmentDirectory>,
    pins: SegmentPins,
    stats: Arc<WalStats>,
    buffer_size: usize,
    /// Contiguous segment indexes covered by this session.
    segments: Vec<u64>,
    /// Position in `segments` of the open reader.
    cursor: usize,
    end: Option<LogPointer>,
    current: Option<SegmentReader>,
    state: ReplayState,
    last: Option<LogPointer>,
}

impl LogReplay {
    /// Opens a session positioned just before the record at `start`.
    ///
    /// With no start pointer the session begins at the first record of the
    /// oldest segment.
    ///
    /// # Errors
    ///
    /// Returns `SegmentMissing` if the start segment, or any segment between
    /// it and the head, no longer exists, and `HeaderCorruption` or
    /// `UnsupportedVersion` if the start segment's header is invalid.
    pub fn open(dir: Arc<dyn SegmentDirectory>, start: Option<LogPointer>) -> CoreResult<Self> {
        Self::open_range(dir, start, None)
    }

    /// Opens a session that stops before the record at `end`.
    ///
    /// # Errors
    ///
    /// See [`LogReplay::open`].
    pub fn open_range(
        dir: Arc<dyn SegmentDirectory>,
        start: Option<LogPointer>,
        end: Option<LogPointer>,
    ) -> CoreResult<Self> {
        Self::open_with(
            dir,
            SegmentPins::new(),
            Arc::new(WalStats::new()),
            DEFAULT_READ_BUFFER,
            start,
            end,
        )
    }

    pub(crate) fn open_with(
        dir: Arc<dyn SegmentDirectory>,
        pins: SegmentPins,
        stats: Arc<WalStats>,
        buffer_size: usize,
        start: Option<LogPointer>,
        end: Option<LogPointer>,
    ) -> CoreResult<Self> {
        stats.record_replay_session();

        let listed = dir.list_segments()?;
        let mut replay = Self {
            dir,
            pins,
            stats,
            buffer_size,
            segments: Vec::new(),
            cursor: 0,
            end,
            current: None,
            state: ReplayState::Exhausted,
            last: None,
        };

        let first = match (start, listed.first()) {
            (Some(ptr), _) => ptr.index(),
            (None, Some(&oldest)) => oldest,
            (None, None) => return Ok(replay),
        };
        if listed.binary_search(&first).is_err() {
            return Err(CoreError::SegmentMissing { index: first });
        }

        let mut expected = first;
        for &index in listed.iter().filter(|&&i| i >= first) {
            if end.is_some_and(|e| index > e.index()) {
                break;
            }
            if index != expected {
                return Err(CoreError::SegmentMissing { index: expected });
            }
            replay.segments.push(index);
            expected = index + 1;
        }

        let offset = start.map_or(0, |p| u64::from(p.offset()));
        replay.current = Some(replay.open_segment(first, offset)?);
        replay.state = ReplayState::Positioned;

        debug!(
            start = %start.map_or_else(|| "oldest".to_string(), |p| p.to_string()),
            segments = replay.segments.len(),
            "opened replay session"
        );
        Ok(replay)
    }

    fn open_segment(&self, index: u64, offset: u64) -> CoreResult<SegmentReader> {
        let pin = self.pins.pin(index);
        let backend = self.dir.open_for_read(index)?;
        SegmentReader::open(index, backend, Some(pin), offset, self.buffer_size)
    }

    /// Current state of the session.
    #[must_use]
    pub fn state(&self) -> ReplayState {
        self.state
    }

    /// Pointer of the most recently yielded record.
    #[must_use]
    pub fn last_pointer(&self) -> Option<LogPointer> {
        self.last
    }

    /// Segment indexes this session covers.
    #[must_use]
    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    fn is_last_segment(&self) -> bool {
        self.cursor + 1 >= self.segments.len()
    }

    fn finish(&mut self) {
        self.current = None;
        self.state = ReplayState::Exhausted;
    }

    fn switch_segment(&mut self) -> CoreResult<()> {
        let Some(&index) = self.segments.get(self.cursor + 1) else {
            self.finish();
            return Ok(());
        };

        self.state = ReplayState::SwitchingSegment;
        debug!(segment = index, "switching replay segment");
        // The next segment is pinned while the current pin is still held.
        match self.open_segment(index, 0) {
            Ok(reader) => {
                self.current = Some(reader);
                self.cursor += 1;
                self.state = ReplayState::Positioned;
                Ok(())
            }
            Err(e) => {
                self.finish();
                Err(e)
            }
        }
    }

    /// Reads the next record.
    ///
    /// Returns `Ok(None)` once the session is exhausted; after an error the
    /// session is exhausted too.
    ///
    /// # Errors
    ///
    /// Returns corruption errors for damaged records outside the newest
    /// segment of the range, header errors for segments entered along the
    /// way, and I/O errors.
    pub fn advance(&mut self) -> CoreResult<Option<(LogPointer, WalRecord)>> {
        loop {
            if self.state == ReplayState::Exhausted {
                return Ok(None);
            }
            let Some(reader) = self.current.as_mut() else {
                self.state = ReplayState::Exhausted;
                return Ok(None);
            };

            self.state = ReplayState::Advancing;
            let outcome = match reader.read_next() {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.finish();
                    return Err(e);
                }
            };

            match outcome {
                ReadOutcome::Record(ptr, record) => {
                    if self.end.is_some_and(|end| ptr >= end) {
                        self.finish();
                        return Ok(None);
                    }
                    debug_assert!(self.last.map_or(true, |last| last < ptr));
                    self.stats.record_replayed(u64::from(ptr.length()));
                    self.last = Some(ptr);
                    self.state = ReplayState::Positioned;
                    return Ok(Some((ptr, record)));
                }
                ReadOutcome::End => self.switch_segment()?,
                ReadOutcome::Invalid(err) => {
                    let (segment, offset, size) = (reader.index(), reader.position(), reader.size());
                    if !self.is_last_segment() {
                        self.finish();
                        return Err(err);
                    }
                    warn!(
                        segment,
                        offset,
                        size,
                        error = %err,
                        "discarding damaged tail of newest segment"
                    );
                    self.stats.record_tail_discarded();
                    self.finish();
                    return Ok(None);
                }
            }
        }
    }

    /// Releases the open segment. Further reads return nothing.
    pub fn close(&mut self) {
        self.finish();
    }
}

impl Iterator for LogReplay {
    type Item = CoreResult<(LogPointer, WalRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance().transpose()
    }
}

impl fmt::Debug for LogReplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogReplay")
            .field("segments", &self.segments)
            .field("cursor", &self.cursor)
            .field("state", &self.state)
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}
