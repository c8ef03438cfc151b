//! Segment writer and log handle.

use crate::config::WalConfig;
use crate::error::{CoreError, CoreResult};
use crate::pointer::{LogPointer, MAX_POINTER_OFFSET};
use crate::stats::WalStats;
use crate::wal::codec::{encode_header, serializer_for_version, RecordSerializer, HEADER_FRAME_SIZE};
use crate::wal::directory::SegmentDirectory;
use crate::wal::pins::{SegmentPin, SegmentPins};
use crate::wal::record::WalRecord;
use crate::wal::replay::LogReplay;
use crate::wal::segment::{ReadOutcome, SegmentReader};
use parking_lot::Mutex;
use partlog_storage::StorageBackend;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

struct ActiveSegment {
    index: u64,
    backend: Box<dyn StorageBackend>,
    /// Offset where the next frame goes.
    position: u64,
    serializer: &'static dyn RecordSerializer,
}

/// Owns the active segment and hands out replay sessions.
///
/// Appends are serialized by an internal lock; replay sessions read
/// independently and may run concurrently with appends.
pub struct WalManager {
    dir: Arc<dyn SegmentDirectory>,
    config: WalConfig,
    pins: SegmentPins,
    stats: Arc<WalStats>,
    active: Mutex<ActiveSegment>,
}

impl WalManager {
    /// Opens the log and starts a fresh segment after the newest existing one.
    ///
    /// A damaged tail in the previous newest segment is truncated to the end
    /// of its last valid record first, so replays that cross it later do not
    /// see corruption in a non-final segment.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an unusable configuration, header errors
    /// if the newest segment's header is invalid, and I/O errors.
    pub fn open(dir: Arc<dyn SegmentDirectory>, config: WalConfig) -> CoreResult<Self> {
        if serializer_for_version(config.format_version).is_none() {
            return Err(CoreError::invalid_argument(format!(
                "unknown record format version {}",
                config.format_version
            )));
        }
        if config.segment_size <= HEADER_FRAME_SIZE as u64
            || config.segment_size > u64::from(MAX_POINTER_OFFSET)
        {
            return Err(CoreError::invalid_argument(format!(
                "segment size {} must exceed the header and not exceed {MAX_POINTER_OFFSET}",
                config.segment_size
            )));
        }

        let stats = Arc::new(WalStats::new());
        let existing = dir.list_segments()?;
        let next_index = match existing.last() {
            Some(&newest) => {
                seal_segment(dir.as_ref(), newest, config.read_buffer_size)?;
                newest + 1
            }
            None => 0,
        };

        let active = create_active(dir.as_ref(), &config, &stats, next_index)?;
        info!(
            segment = next_index,
            existing = existing.len(),
            version = config.format_version,
            "opened write-ahead log"
        );

        Ok(Self {
            dir,
            config,
            pins: SegmentPins::new(),
            stats,
            active: Mutex::new(active),
        })
    }

    /// Appends a record and returns its pointer.
    ///
    /// Rotates first if the frame would push the active segment past
    /// `segment_size`. A frame larger than a whole segment still goes into a
    /// fresh segment of its own.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for header records (those are written only
    /// by rotation) and I/O errors.
    pub fn append(&self, record: &WalRecord) -> CoreResult<LogPointer> {
        if matches!(record, WalRecord::Header { .. }) {
            return Err(CoreError::invalid_argument(
                "header records are written by segment rotation",
            ));
        }

        let mut active = self.active.lock();
        let frame = active.serializer.encode(record)?;
        let len = frame.len() as u64;

        if active.position + len > self.config.segment_size
            && active.position > HEADER_FRAME_SIZE as u64
        {
            self.rotate_locked(&mut active)?;
        }

        let offset = active.position;
        if offset + len > u64::from(MAX_POINTER_OFFSET) {
            return Err(CoreError::invalid_argument(format!(
                "record of {len} bytes at offset {offset} exceeds segment addressing"
            )));
        }
        // Both fit below MAX_POINTER_OFFSET.
        let (offset32, len32) = (offset as u32, len as u32);

        active.backend.write_at(offset, &frame)?;
        active.position += len;
        self.stats.record_append(len);

        if self.config.sync_on_write {
            active.backend.flush()?;
            active.backend.sync()?;
            self.stats.record_flush();
        }

        Ok(LogPointer::with_length(active.index, offset32, len32))
    }

    /// Makes every record appended so far durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    pub fn flush(&self) -> CoreResult<()> {
        let mut active = self.active.lock();
        active.backend.flush()?;
        active.backend.sync()?;
        self.stats.record_flush();
        Ok(())
    }

    /// Seals the active segment and starts the next one.
    ///
    /// Returns the new segment index.
    ///
    /// # Errors
    ///
    /// Returns an error if the old segment cannot be synced or the new one
    /// cannot be created.
    pub fn rotate(&self) -> CoreResult<u64> {
        let mut active = self.active.lock();
        self.rotate_locked(&mut active)?;
        Ok(active.index)
    }

    fn rotate_locked(&self, active: &mut ActiveSegment) -> CoreResult<()> {
        active.backend.flush()?;
        active.backend.sync()?;
        self.stats.record_flush();

        let next = create_active(self.dir.as_ref(), &self.config, &self.stats, active.index + 1)?;
        info!(
            from = active.index,
            to = next.index,
            size = active.position,
            "rotated segment"
        );
        *active = next;
        Ok(())
    }

    /// Index of the segment currently written.
    #[must_use]
    pub fn current_segment(&self) -> u64 {
        self.active.lock().index
    }

    /// Pointer at which the next record will be written (length unknown).
    #[must_use]
    pub fn head(&self) -> LogPointer {
        let active = self.active.lock();
        LogPointer::new(active.index, active.position as u32)
    }

    /// Existing segment indexes, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    pub fn segments(&self) -> CoreResult<Vec<u64>> {
        self.dir.list_segments()
    }

    /// Opens a replay session from `start` to the head.
    ///
    /// # Errors
    ///
    /// See [`LogReplay::open`].
    pub fn replay(&self, start: Option<LogPointer>) -> CoreResult<LogReplay> {
        self.replay_range(start, None)
    }

    /// Opens a replay session from `start` that stops before `end`.
    ///
    /// # Errors
    ///
    /// See [`LogReplay::open`].
    pub fn replay_range(
        &self,
        start: Option<LogPointer>,
        end: Option<LogPointer>,
    ) -> CoreResult<LogReplay> {
        LogReplay::open_with(
            Arc::clone(&self.dir),
            self.pins.clone(),
            Arc::clone(&self.stats),
            self.config.read_buffer_size,
            start,
            end,
        )
    }

    /// Reads the single record at `ptr`.
    ///
    /// # Errors
    ///
    /// Returns `SegmentMissing` if the segment is gone and `WalCorruption`
    /// if no valid record starts at `ptr`.
    pub fn read_record(&self, ptr: LogPointer) -> CoreResult<WalRecord> {
        read_record_in(
            self.dir.as_ref(),
            Some(self.pins.pin(ptr.index())),
            self.config.read_buffer_size,
            ptr,
        )
    }

    /// Fills in the bytes of a page update that references a data record.
    ///
    /// Records without an unresolved reference are left untouched.
    ///
    /// # Errors
    ///
    /// Returns `WalCorruption` if the reference does not point at a data
    /// record of the declared size.
    pub fn resolve_reference(&self, record: &mut WalRecord) -> CoreResult<()> {
        fill_reference(record, |ptr| self.read_record(ptr))
    }

    /// Pins a segment, e.g. for the duration of a rebalance.
    ///
    /// # Errors
    ///
    /// Returns `SegmentMissing` if the segment does not exist.
    pub fn pin(&self, index: u64) -> CoreResult<SegmentPin> {
        let pin = self.pins.pin(index);
        if self.dir.list_segments()?.binary_search(&index).is_err() {
            return Err(CoreError::SegmentMissing { index });
        }
        Ok(pin)
    }

    /// Shared pin table.
    #[must_use]
    pub fn pins(&self) -> &SegmentPins {
        &self.pins
    }

    /// Removes segments older than `index`.
    ///
    /// Stops below the lowest pinned segment and never removes the active
    /// one. Returns how many segments were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if listing or removal fails.
    pub fn release_before(&self, index: u64) -> CoreResult<usize> {
        let active = self.current_segment();
        let mut limit = index.min(active);
        if let Some(pinned) = self.pins.min_pinned() {
            if pinned < limit {
                debug!(requested = index, pinned, "segment release held back by reader");
            }
            limit = limit.min(pinned);
        }

        let mut removed = 0;
        for segment in self.dir.list_segments()? {
            if segment >= limit {
                break;
            }
            if self.pins.is_pinned(segment) {
                return Err(CoreError::SegmentInUse { index: segment });
            }
            self.dir.remove(segment)?;
            self.stats.record_segment_removed();
            removed += 1;
        }

        if removed > 0 {
            info!(removed, below = limit, "released old segments");
        }
        Ok(removed)
    }

    /// Log statistics.
    #[must_use]
    pub fn stats(&self) -> &WalStats {
        &self.stats
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &WalConfig {
        &self.config
    }

    /// Segment directory backing this log.
    #[must_use]
    pub fn directory(&self) -> &Arc<dyn SegmentDirectory> {
        &self.dir
    }
}

impl fmt::Debug for WalManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let active = self.active.lock();
        f.debug_struct("WalManager")
            .field("segment", &active.index)
            .field("position", &active.position)
            .field("version", &active.serializer.version())
            .field("pins", &self.pins)
            .finish_non_exhaustive()
    }
}

/// Reads the record starting exactly at `ptr`.
pub(crate) fn read_record_in(
    dir: &dyn SegmentDirectory,
    pin: Option<SegmentPin>,
    buffer_size: usize,
    ptr: LogPointer,
) -> CoreResult<WalRecord> {
    let backend = dir.open_for_read(ptr.index())?;
    let mut reader =
        SegmentReader::open(ptr.index(), backend, pin, u64::from(ptr.offset()), buffer_size)?;

    match reader.read_next()? {
        ReadOutcome::Record(at, record) if at == ptr => Ok(record),
        ReadOutcome::Invalid(e) => Err(e),
        _ => Err(CoreError::wal_corruption(
            ptr.index(),
            u64::from(ptr.offset()),
            "no record at pointer",
        )),
    }
}

/// Back-fills a referencing page update from the data record `read` returns.
pub(crate) fn fill_reference(
    record: &mut WalRecord,
    read: impl FnOnce(LogPointer) -> CoreResult<WalRecord>,
) -> CoreResult<()> {
    if !record.needs_payload() {
        return Ok(());
    }
    let WalRecord::PageUpdate {
        reference: Some(ptr),
        payload_size,
        payload,
        ..
    } = record
    else {
        return Ok(());
    };

    let referenced = read(*ptr)?;
    let kind = referenced.record_type();
    let WalRecord::Data { payload: bytes, .. } = referenced else {
        return Err(CoreError::wal_corruption(
            ptr.index(),
            u64::from(ptr.offset()),
            format!("reference points at {kind:?}, expected data"),
        ));
    };
    if bytes.len() != *payload_size as usize {
        return Err(CoreError::wal_corruption(
            ptr.index(),
            u64::from(ptr.offset()),
            format!(
                "referenced record holds {} bytes, page update declares {payload_size}",
                bytes.len()
            ),
        ));
    }

    *payload = bytes;
    Ok(())
}

fn create_active(
    dir: &dyn SegmentDirectory,
    config: &WalConfig,
    stats: &WalStats,
    index: u64,
) -> CoreResult<ActiveSegment> {
    let header = encode_header(config.format_version)?;
    let serializer = serializer_for_version(config.format_version).ok_or_else(|| {
        CoreError::invalid_argument(format!(
            "unknown record format version {}",
            config.format_version
        ))
    })?;

    let mut backend = dir.create_segment(index, &header)?;
    if config.preallocate {
        backend.preallocate(config.segment_size)?;
    }
    stats.record_segment_created();
    debug!(segment = index, preallocated = config.preallocate, "created segment");

    Ok(ActiveSegment {
        index,
        backend,
        position: header.len() as u64,
        serializer,
    })
}

/// Truncates a damaged tail of `index` at its last valid record.
fn seal_segment(dir: &dyn SegmentDirectory, index: u64, buffer_size: usize) -> CoreResult<()> {
    let backend = dir.open_for_read(index)?;
    let mut reader = SegmentReader::open(index, backend, None, 0, buffer_size)?;

    let mut records = 0u64;
    loop {
        match reader.read_next()? {
            ReadOutcome::Record(..) => records += 1,
            ReadOutcome::End => return Ok(()),
            ReadOutcome::Invalid(err) => {
                let valid_end = reader.position();
                warn!(
                    segment = index,
                    offset = valid_end,
                    records,
                    error = %err,
                    "truncating damaged tail of previous segment"
                );
                let mut backend = dir.open_for_append(index)?;
                backend.truncate(valid_end)?;
                backend.sync()?;
                return Ok(());
            }
        }
    }
}
