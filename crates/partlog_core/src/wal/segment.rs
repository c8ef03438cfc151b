//! Buffered reader over a single segment.

use crate::error::{CoreError, CoreResult};
use crate::pointer::{LogPointer, MAX_POINTER_OFFSET};
use crate::wal::codec::{
    decode_header, read_len, RecordSerializer, FRAME_PREFIX_SIZE, HEADER_FRAME_SIZE,
};
use crate::wal::pins::SegmentPin;
use crate::wal::record::WalRecord;
use partlog_storage::StorageBackend;

/// Result of one read attempt inside a segment.
#[derive(Debug)]
pub(crate) enum ReadOutcome {
    /// A complete, valid record.
    Record(LogPointer, WalRecord),
    /// Physical end of the segment or zero padding.
    End,
    /// A damaged record. The error locates it.
    Invalid(CoreError),
}

/// Reads records sequentially from one segment.
///
/// The segment size is sampled when the reader opens; bytes appended later
/// by a concurrent writer are not visible to this reader.
pub(crate) struct SegmentReader {
    index: u64,
    backend: Box<dyn StorageBackend>,
    serializer: &'static dyn RecordSerializer,
    size: u64,
    /// Offset of the next unread byte.
    position: u64,
    buffer: Vec<u8>,
    buffer_pos: usize,
    buffer_len: usize,
    finished: bool,
    _pin: Option<SegmentPin>,
}

impl SegmentReader {
    /// Opens a reader positioned before the record at `start_offset`.
    ///
    /// Offsets inside the header mean "first record after the header".
    ///
    /// # Errors
    ///
    /// Returns `HeaderCorruption`/`UnsupportedVersion` for a bad header and
    /// `InvalidArgument` if `start_offset` lies past the segment end.
    pub(crate) fn open(
        index: u64,
        backend: Box<dyn StorageBackend>,
        pin: Option<SegmentPin>,
        start_offset: u64,
        buffer_size: usize,
    ) -> CoreResult<Self> {
        let size = backend.size()?;
        let head_len = size.min(HEADER_FRAME_SIZE as u64) as usize;
        let head = backend.read_at(0, head_len)?;
        let serializer = decode_header(&head, index)?;

        let position = start_offset.max(HEADER_FRAME_SIZE as u64);
        if position > size {
            return Err(CoreError::invalid_argument(format!(
                "offset {start_offset} is past the end of segment {index} ({size} bytes)"
            )));
        }

        Ok(Self {
            index,
            backend,
            serializer,
            size,
            position,
            buffer: vec![0u8; buffer_size.max(FRAME_PREFIX_SIZE)],
            buffer_pos: 0,
            buffer_len: 0,
            finished: false,
            _pin: pin,
        })
    }

    pub(crate) fn index(&self) -> u64 {
        self.index
    }

    /// Offset of the next record to be read.
    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    /// Ensures at least `min_bytes` from the current position are buffered.
    ///
    /// Returns `false` if the segment ends first. Grows the buffer for
    /// frames larger than it.
    fn ensure_buffered(&mut self, min_bytes: usize) -> CoreResult<bool> {
        let available = self.buffer_len - self.buffer_pos;
        if available >= min_bytes {
            return Ok(true);
        }

        let unread = (self.size - self.position) as usize;
        if unread < min_bytes {
            return Ok(false);
        }

        if self.buffer_pos > 0 && available > 0 {
            self.buffer.copy_within(self.buffer_pos..self.buffer_len, 0);
        }
        self.buffer_len = available;
        self.buffer_pos = 0;

        if min_bytes > self.buffer.len() {
            self.buffer.resize(min_bytes.next_power_of_two(), 0);
        }

        let to_read = (self.buffer.len() - self.buffer_len).min(unread - available);
        if to_read > 0 {
            let from = self.position + self.buffer_len as u64;
            let data = self.backend.read_at(from, to_read)?;
            self.buffer[self.buffer_len..self.buffer_len + data.len()].copy_from_slice(&data);
            self.buffer_len += data.len();
        }

        Ok(self.buffer_len - self.buffer_pos >= min_bytes)
    }

    fn consume(&mut self, n: usize) {
        self.buffer_pos += n;
        self.position += n as u64;
    }

    fn invalid(&mut self, err: CoreError) -> ReadOutcome {
        self.finished = true;
        ReadOutcome::Invalid(err)
    }

    /// Reads the record at the current position.
    ///
    /// # Errors
    ///
    /// Returns I/O errors only; damaged bytes are reported as
    /// [`ReadOutcome::Invalid`].
    pub(crate) fn read_next(&mut self) -> CoreResult<ReadOutcome> {
        if self.finished || self.position >= self.size {
            self.finished = true;
            return Ok(ReadOutcome::End);
        }

        let offset = self.position;
        let at = LogPointer::new(self.index, offset as u32);

        self.ensure_buffered(1)?;
        if self.buffer[self.buffer_pos] == 0 {
            // zero padding
            self.finished = true;
            return Ok(ReadOutcome::End);
        }

        if !self.ensure_buffered(FRAME_PREFIX_SIZE)? {
            return Ok(self.invalid(CoreError::wal_corruption(
                self.index,
                offset,
                "truncated frame prefix",
            )));
        }

        let len = read_len(&self.buffer[self.buffer_pos..self.buffer_pos + FRAME_PREFIX_SIZE]);
        let frame_size = self.serializer.frame_size(len);
        if offset + frame_size as u64 > self.size {
            return Ok(self.invalid(CoreError::wal_corruption(
                self.index,
                offset,
                format!(
                    "record of {frame_size} bytes runs past segment end at {}",
                    self.size
                ),
            )));
        }
        if offset + frame_size as u64 > u64::from(MAX_POINTER_OFFSET) {
            return Ok(self.invalid(CoreError::wal_corruption(
                self.index,
                offset,
                "record extends beyond addressable segment range",
            )));
        }

        if !self.ensure_buffered(frame_size)? {
            return Ok(self.invalid(CoreError::wal_corruption(
                self.index,
                offset,
                "truncated frame",
            )));
        }

        let frame = &self.buffer[self.buffer_pos..self.buffer_pos + frame_size];
        match self.serializer.decode(frame, at) {
            Ok(record) => {
                self.consume(frame_size);
                Ok(ReadOutcome::Record(
                    LogPointer::with_length(self.index, offset as u32, frame_size as u32),
                    record,
                ))
            }
            Err(e) if e.is_record_corruption() => Ok(self.invalid(e)),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GroupId, PartitionId};
    use crate::wal::codec::{encode_header, serializer_for_version};
    use partlog_storage::InMemoryBackend;

    fn data(counter: u64, len: usize) -> WalRecord {
        WalRecord::Data {
            group_id: GroupId::new(1),
            partition: PartitionId::new(0),
            counter,
            payload: vec![counter as u8; len],
        }
    }

    fn segment(version: u16, records: &[WalRecord]) -> (Vec<u8>, Vec<u64>) {
        let serializer = serializer_for_version(version).unwrap();
        let mut bytes = encode_header(version).unwrap();
        let mut offsets = Vec::new();
        for r in records {
            offsets.push(bytes.len() as u64);
            bytes.extend_from_slice(&serializer.encode(r).unwrap());
        }
        (bytes, offsets)
    }

    fn reader(bytes: Vec<u8>, start: u64, buffer: usize) -> SegmentReader {
        SegmentReader::open(0, Box::new(InMemoryBackend::with_data(bytes)), None, start, buffer)
            .unwrap()
    }

    fn read_all(r: &mut SegmentReader) -> (Vec<(LogPointer, WalRecord)>, ReadOutcome) {
        let mut out = Vec::new();
        loop {
            match r.read_next().unwrap() {
                ReadOutcome::Record(p, rec) => out.push((p, rec)),
                other => return (out, other),
            }
        }
    }

    #[test]
    fn reads_records_in_order() {
        let records = vec![data(1, 10), data(2, 0), data(3, 300)];
        let (bytes, offsets) = segment(2, &records);
        let mut r = reader(bytes, 0, 64);

        let (read, end) = read_all(&mut r);
        assert!(matches!(end, ReadOutcome::End));
        assert_eq!(read.len(), 3);
        for ((ptr, rec), (off, expected)) in read.iter().zip(offsets.iter().zip(&records)) {
            assert_eq!(u64::from(ptr.offset()), *off);
            assert!(ptr.length() > 0);
            assert_eq!(rec, expected);
        }
    }

    #[test]
    fn large_record_grows_buffer() {
        let records = vec![data(1, 10_000)];
        let (bytes, _) = segment(1, &records);
        let mut r = reader(bytes, 0, 16);
        let (read, _) = read_all(&mut r);
        assert_eq!(read[0].1, records[0]);
    }

    #[test]
    fn starts_at_offset() {
        let records = vec![data(1, 4), data(2, 4), data(3, 4)];
        let (bytes, offsets) = segment(2, &records);
        let mut r = reader(bytes, offsets[1], 64);
        let (read, _) = read_all(&mut r);
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].1, records[1]);
    }

    #[test]
    fn zero_padding_is_end() {
        let (mut bytes, _) = segment(2, &[data(1, 4)]);
        bytes.resize(bytes.len() + 4096, 0);
        let mut r = reader(bytes, 0, 64);
        let (read, end) = read_all(&mut r);
        assert_eq!(read.len(), 1);
        assert!(matches!(end, ReadOutcome::End));
    }

    #[test]
    fn torn_record_is_invalid() {
        let (bytes, offsets) = segment(2, &[data(1, 4), data(2, 40)]);
        let cut = bytes.len() - 10;
        let mut r = reader(bytes[..cut].to_vec(), 0, 64);
        let (read, end) = read_all(&mut r);
        assert_eq!(read.len(), 1);
        match end {
            ReadOutcome::Invalid(CoreError::WalCorruption { offset, .. }) => {
                assert_eq!(offset, offsets[1]);
            }
            other => panic!("expected corruption, got {other:?}"),
        }
        assert!(matches!(r.read_next().unwrap(), ReadOutcome::End));
    }

    #[test]
    fn corrupt_checksum_is_invalid() {
        let (mut bytes, _) = segment(2, &[data(1, 4)]);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xAA;
        let mut r = reader(bytes, 0, 64);
        assert!(matches!(
            r.read_next().unwrap(),
            ReadOutcome::Invalid(CoreError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn missing_header_fails_open() {
        let result = SegmentReader::open(
            5,
            Box::new(InMemoryBackend::with_data(vec![0u8; 64])),
            None,
            0,
            64,
        );
        assert!(matches!(
            result,
            Err(CoreError::HeaderCorruption { segment: 5, .. })
        ));
    }

    #[test]
    fn start_past_end_rejected() {
        let (bytes, _) = segment(2, &[]);
        let result = SegmentReader::open(
            0,
            Box::new(InMemoryBackend::with_data(bytes)),
            None,
            1000,
            64,
        );
        assert!(matches!(result, Err(CoreError::InvalidArgument { .. })));
    }
}
