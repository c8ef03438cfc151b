//! Record framing and versioned serializers.
//!
//! ## Frame Format
//!
//! ```text
//! | type (1) | length (4) | payload (length) | crc32 (4, version >= 2) |
//! ```
//!
//! The checksum covers type, length and payload. The segment header frame
//! always carries a checksum, whatever version it declares, so a reader can
//! trust the version before choosing a serializer.

use crate::error::{CoreError, CoreResult};
use crate::pointer::LogPointer;
use crate::wal::record::{WalRecord, WalRecordType};
use std::fmt;

/// Type byte plus length.
pub const FRAME_PREFIX_SIZE: usize = 5;

/// Size of the trailing checksum.
pub const CRC_SIZE: usize = 4;

/// Magic (4) plus version (2).
const HEADER_PAYLOAD_SIZE: usize = 6;

/// Full size of the header frame at offset 0 of every segment.
pub const HEADER_FRAME_SIZE: usize = FRAME_PREFIX_SIZE + HEADER_PAYLOAD_SIZE + CRC_SIZE;

/// Oldest record format this build reads.
pub const MIN_FORMAT_VERSION: u16 = 1;

/// Record format written by default.
pub const CURRENT_FORMAT_VERSION: u16 = 2;

/// Encodes and decodes record frames for one format version.
pub trait RecordSerializer: Send + Sync + fmt::Debug {
    /// Format version handled by this serializer.
    fn version(&self) -> u16;

    /// Bytes following the payload in each frame.
    fn trailer_size(&self) -> usize;

    /// Serializes a record into a complete frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be represented.
    fn encode(&self, record: &WalRecord) -> CoreResult<Vec<u8>>;

    /// Deserializes a complete frame located at `at`.
    ///
    /// # Errors
    ///
    /// Returns `WalCorruption` or `ChecksumMismatch` for an invalid frame.
    fn decode(&self, frame: &[u8], at: LogPointer) -> CoreResult<WalRecord>;

    /// Size of a frame whose payload is `payload_len` bytes.
    fn frame_size(&self, payload_len: u32) -> usize {
        FRAME_PREFIX_SIZE + payload_len as usize + self.trailer_size()
    }
}

/// Format 1: frames without checksum.
#[derive(Debug, Clone, Copy, Default)]
pub struct V1Serializer;

/// Format 2: frames with a trailing CRC32.
#[derive(Debug, Clone, Copy, Default)]
pub struct V2Serializer;

static V1: V1Serializer = V1Serializer;
static V2: V2Serializer = V2Serializer;

/// Returns the serializer for a declared format version.
#[must_use]
pub fn serializer_for_version(version: u16) -> Option<&'static dyn RecordSerializer> {
    match version {
        1 => Some(&V1),
        2 => Some(&V2),
        _ => None,
    }
}

impl RecordSerializer for V1Serializer {
    fn version(&self) -> u16 {
        1
    }

    fn trailer_size(&self) -> usize {
        0
    }

    fn encode(&self, record: &WalRecord) -> CoreResult<Vec<u8>> {
        encode_frame(record, false)
    }

    fn decode(&self, frame: &[u8], at: LogPointer) -> CoreResult<WalRecord> {
        decode_frame(frame, false, at)
    }
}

impl RecordSerializer for V2Serializer {
    fn version(&self) -> u16 {
        2
    }

    fn trailer_size(&self) -> usize {
        CRC_SIZE
    }

    fn encode(&self, record: &WalRecord) -> CoreResult<Vec<u8>> {
        encode_frame(record, true)
    }

    fn decode(&self, frame: &[u8], at: LogPointer) -> CoreResult<WalRecord> {
        decode_frame(frame, true, at)
    }
}

fn encode_frame(record: &WalRecord, with_crc: bool) -> CoreResult<Vec<u8>> {
    let mut frame = Vec::with_capacity(64);
    frame.push(record.record_type().as_byte());
    frame.extend_from_slice(&[0u8; 4]);
    record.encode_payload(&mut frame)?;

    let len = u32::try_from(frame.len() - FRAME_PREFIX_SIZE)
        .map_err(|_| CoreError::invalid_argument("WAL record payload too large"))?;
    frame[1..FRAME_PREFIX_SIZE].copy_from_slice(&len.to_le_bytes());

    if with_crc {
        let crc = crc32fast::hash(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
    }
    Ok(frame)
}

fn decode_frame(frame: &[u8], with_crc: bool, at: LogPointer) -> CoreResult<WalRecord> {
    let offset = u64::from(at.offset());
    let corruption = |message: String| CoreError::wal_corruption(at.index(), offset, message);

    let trailer = if with_crc { CRC_SIZE } else { 0 };
    if frame.len() < FRAME_PREFIX_SIZE + trailer {
        return Err(corruption(format!("frame too short: {} bytes", frame.len())));
    }

    let type_byte = frame[0];
    let record_type = WalRecordType::from_byte(type_byte)
        .ok_or_else(|| corruption(format!("unknown record type {type_byte}")))?;
    if record_type == WalRecordType::Header {
        return Err(corruption("header record inside segment body".into()));
    }

    let len = read_len(frame);
    let body_end = FRAME_PREFIX_SIZE + len as usize;
    if frame.len() != body_end + trailer {
        return Err(corruption(format!(
            "frame length {} does not match declared payload {len}",
            frame.len()
        )));
    }

    if with_crc {
        let expected = read_crc(&frame[body_end..]);
        let actual = crc32fast::hash(&frame[..body_end]);
        if expected != actual {
            return Err(CoreError::ChecksumMismatch {
                segment: at.index(),
                offset,
                expected,
                actual,
            });
        }
    }

    WalRecord::decode_payload(record_type, &frame[FRAME_PREFIX_SIZE..body_end], at)
}

/// Reads the payload length from a frame prefix.
pub(crate) fn read_len(prefix: &[u8]) -> u32 {
    u32::from_le_bytes([prefix[1], prefix[2], prefix[3], prefix[4]])
}

fn read_crc(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Builds the header frame declaring `version`.
///
/// # Errors
///
/// Returns an error if no serializer exists for `version`.
pub fn encode_header(version: u16) -> CoreResult<Vec<u8>> {
    if serializer_for_version(version).is_none() {
        return Err(CoreError::invalid_argument(format!(
            "unknown record format version {version}"
        )));
    }
    encode_frame(&WalRecord::Header { version }, true)
}

/// Validates the header frame of `segment` and returns its serializer.
///
/// # Errors
///
/// Returns `HeaderCorruption` if the bytes are not a well-formed header and
/// `UnsupportedVersion` if the declared version is unknown.
pub fn decode_header(bytes: &[u8], segment: u64) -> CoreResult<&'static dyn RecordSerializer> {
    if bytes.len() < HEADER_FRAME_SIZE {
        return Err(CoreError::header_corruption(
            segment,
            format!("segment holds {} bytes, header needs {HEADER_FRAME_SIZE}", bytes.len()),
        ));
    }
    let frame = &bytes[..HEADER_FRAME_SIZE];

    if frame[0] != WalRecordType::Header.as_byte() {
        return Err(CoreError::header_corruption(
            segment,
            format!("first record has type {}, expected header", frame[0]),
        ));
    }
    if read_len(frame) as usize != HEADER_PAYLOAD_SIZE {
        return Err(CoreError::header_corruption(
            segment,
            format!("header payload length {}", read_len(frame)),
        ));
    }

    let body_end = FRAME_PREFIX_SIZE + HEADER_PAYLOAD_SIZE;
    let expected = read_crc(&frame[body_end..]);
    let actual = crc32fast::hash(&frame[..body_end]);
    if expected != actual {
        return Err(CoreError::header_corruption(
            segment,
            format!("header checksum mismatch: expected {expected:08x}, got {actual:08x}"),
        ));
    }

    let record = WalRecord::decode_payload(
        WalRecordType::Header,
        &frame[FRAME_PREFIX_SIZE..body_end],
        LogPointer::new(segment, 0),
    )
    .map_err(|e| CoreError::header_corruption(segment, e.to_string()))?;

    let WalRecord::Header { version } = record else {
        return Err(CoreError::header_corruption(segment, "not a header record"));
    };
    serializer_for_version(version).ok_or(CoreError::UnsupportedVersion { segment, version })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GroupId, PartitionId};

    fn data(counter: u64) -> WalRecord {
        WalRecord::Data {
            group_id: GroupId::new(1),
            partition: PartitionId::new(3),
            counter,
            payload: b"value".to_vec(),
        }
    }

    #[test]
    fn header_frame_size() {
        let header = encode_header(CURRENT_FORMAT_VERSION).unwrap();
        assert_eq!(header.len(), HEADER_FRAME_SIZE);
        let serializer = decode_header(&header, 0).unwrap();
        assert_eq!(serializer.version(), CURRENT_FORMAT_VERSION);
    }

    #[test]
    fn v1_header_still_has_checksum() {
        let header = encode_header(1).unwrap();
        assert_eq!(header.len(), HEADER_FRAME_SIZE);
        assert_eq!(decode_header(&header, 3).unwrap().version(), 1);
    }

    #[test]
    fn unknown_version_rejected() {
        assert!(encode_header(9).is_err());

        let mut frame = vec![WalRecordType::Header.as_byte()];
        frame.extend_from_slice(&6u32.to_le_bytes());
        frame.extend_from_slice(b"PLOG");
        frame.extend_from_slice(&9u16.to_le_bytes());
        let crc = crc32fast::hash(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());

        assert!(matches!(
            decode_header(&frame, 4),
            Err(CoreError::UnsupportedVersion { segment: 4, version: 9 })
        ));
    }

    #[test]
    fn damaged_header_is_header_corruption() {
        let mut header = encode_header(2).unwrap();
        header[7] ^= 0xFF;
        assert!(matches!(
            decode_header(&header, 1),
            Err(CoreError::HeaderCorruption { segment: 1, .. })
        ));

        assert!(matches!(
            decode_header(&[0u8; HEADER_FRAME_SIZE], 1),
            Err(CoreError::HeaderCorruption { .. })
        ));
        assert!(matches!(
            decode_header(&header[..4], 1),
            Err(CoreError::HeaderCorruption { .. })
        ));
    }

    #[test]
    fn v1_frames_have_no_trailer() {
        let v1 = serializer_for_version(1).unwrap();
        let v2 = serializer_for_version(2).unwrap();
        let f1 = v1.encode(&data(1)).unwrap();
        let f2 = v2.encode(&data(1)).unwrap();
        assert_eq!(f1.len() + CRC_SIZE, f2.len());
        assert_eq!(f1.len(), v1.frame_size(read_len(&f1)));

        let at = LogPointer::new(0, HEADER_FRAME_SIZE as u32);
        assert_eq!(v1.decode(&f1, at).unwrap(), data(1));
        assert_eq!(v2.decode(&f2, at).unwrap(), data(1));
    }

    #[test]
    fn flipped_payload_bit_is_checksum_mismatch() {
        let v2 = serializer_for_version(2).unwrap();
        let mut frame = v2.encode(&data(5)).unwrap();
        frame[FRAME_PREFIX_SIZE + 2] ^= 0x01;

        let err = v2.decode(&frame, LogPointer::new(2, 100)).unwrap_err();
        assert!(matches!(
            err,
            CoreError::ChecksumMismatch { segment: 2, offset: 100, .. }
        ));
        assert!(err.is_record_corruption());
    }

    #[test]
    fn header_type_inside_body_rejected() {
        let v2 = serializer_for_version(2).unwrap();
        let frame = encode_header(2).unwrap();
        assert!(v2
            .decode(&frame, LogPointer::new(0, 15))
            .unwrap_err()
            .is_record_corruption());
    }

    #[test]
    fn unknown_type_is_record_corruption() {
        let v1 = serializer_for_version(1).unwrap();
        let mut frame = v1.encode(&data(1)).unwrap();
        frame[0] = 42;
        assert!(v1
            .decode(&frame, LogPointer::new(0, 15))
            .unwrap_err()
            .is_record_corruption());
    }
}
