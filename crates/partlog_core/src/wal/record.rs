//! WAL record kinds and payload serialization.

use crate::counter::CounterSnapshot;
use crate::error::{CoreError, CoreResult};
use crate::pointer::{LogPointer, POINTER_SIZE};
use crate::types::{GroupId, PageId, PartitionId};

/// Magic bytes opening every segment header payload.
pub const SEGMENT_MAGIC: [u8; 4] = *b"PLOG";

/// Type of WAL record, stored as the first byte of every frame.
///
/// The byte `0` is never a record type: it marks zero padding at the end of
/// a preallocated segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WalRecordType {
    /// Segment header declaring the record format version.
    Header = 1,
    /// Logical partition update carrying its update number.
    Data = 2,
    /// New item written into a data page.
    PageInsert = 3,
    /// Existing item of a data page rewritten.
    PageUpdate = 4,
    /// Item removed from a data page.
    PageRemove = 5,
    /// Checkpoint marker.
    Checkpoint = 6,
}

impl WalRecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Header),
            2 => Some(Self::Data),
            3 => Some(Self::PageInsert),
            4 => Some(Self::PageUpdate),
            5 => Some(Self::PageRemove),
            6 => Some(Self::Checkpoint),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Counter state of one partition captured by a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionState {
    /// Owning group.
    pub group_id: GroupId,
    /// Partition within the group.
    pub partition: PartitionId,
    /// Update counter at checkpoint time.
    pub counter: CounterSnapshot,
}

/// A WAL record describing one durable mutation or marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    /// First record of every segment.
    Header {
        /// Record format version used by the rest of the segment.
        version: u16,
    },

    /// Logical update of a partition entry.
    Data {
        /// Owning group.
        group_id: GroupId,
        /// Partition the update belongs to.
        partition: PartitionId,
        /// Update number reserved from the partition counter.
        counter: u64,
        /// Serialized entry.
        payload: Vec<u8>,
    },

    /// New item written into a data page.
    PageInsert {
        /// Owning group.
        group_id: GroupId,
        /// Target page.
        page_id: PageId,
        /// Item bytes.
        payload: Vec<u8>,
    },

    /// Existing page item rewritten.
    ///
    /// When `reference` is set the bytes live in a separately logged
    /// [`WalRecord::Data`] record and `payload` is empty until resolved.
    PageUpdate {
        /// Owning group.
        group_id: GroupId,
        /// Target page.
        page_id: PageId,
        /// Item slot within the page.
        item_id: u16,
        /// Declared size of the item bytes.
        payload_size: u32,
        /// Pointer to the record holding the bytes, if stored elsewhere.
        reference: Option<LogPointer>,
        /// Item bytes (empty while an external reference is unresolved).
        payload: Vec<u8>,
    },

    /// Page item removed.
    PageRemove {
        /// Owning group.
        group_id: GroupId,
        /// Target page.
        page_id: PageId,
        /// Item slot within the page.
        item_id: u16,
    },

    /// Checkpoint marker.
    Checkpoint {
        /// Checkpoint identifier, increasing across checkpoints.
        id: u64,
        /// Update counters of every partition at checkpoint time.
        partitions: Vec<PartitionState>,
    },
}

impl WalRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> WalRecordType {
        match self {
            Self::Header { .. } => WalRecordType::Header,
            Self::Data { .. } => WalRecordType::Data,
            Self::PageInsert { .. } => WalRecordType::PageInsert,
            Self::PageUpdate { .. } => WalRecordType::PageUpdate,
            Self::PageRemove { .. } => WalRecordType::PageRemove,
            Self::Checkpoint { .. } => WalRecordType::Checkpoint,
        }
    }

    /// Returns the owning group for records tied to one.
    #[must_use]
    pub fn group_id(&self) -> Option<GroupId> {
        match self {
            Self::Data { group_id, .. }
            | Self::PageInsert { group_id, .. }
            | Self::PageUpdate { group_id, .. }
            | Self::PageRemove { group_id, .. } => Some(*group_id),
            Self::Header { .. } | Self::Checkpoint { .. } => None,
        }
    }

    /// Returns true for a page update whose bytes still need resolving.
    #[must_use]
    pub fn needs_payload(&self) -> bool {
        matches!(
            self,
            Self::PageUpdate {
                reference: Some(_),
                payload,
                payload_size,
                ..
            } if payload.len() != *payload_size as usize
        )
    }

    /// Serializes the record payload (without frame).
    ///
    /// # Errors
    ///
    /// Returns an error if a byte field does not fit its 4-byte length, or
    /// an inline page update's payload disagrees with `payload_size`.
    pub fn encode_payload(&self, buf: &mut Vec<u8>) -> CoreResult<()> {
        match self {
            Self::Header { version } => {
                buf.extend_from_slice(&SEGMENT_MAGIC);
                buf.extend_from_slice(&version.to_le_bytes());
            }

            Self::Data {
                group_id,
                partition,
                counter,
                payload,
            } => {
                buf.extend_from_slice(&group_id.as_u32().to_le_bytes());
                buf.extend_from_slice(&partition.as_u16().to_le_bytes());
                buf.extend_from_slice(&counter.to_le_bytes());
                put_bytes(buf, payload)?;
            }

            Self::PageInsert {
                group_id,
                page_id,
                payload,
            } => {
                buf.extend_from_slice(&group_id.as_u32().to_le_bytes());
                buf.extend_from_slice(&page_id.as_u64().to_le_bytes());
                put_bytes(buf, payload)?;
            }

            Self::PageUpdate {
                group_id,
                page_id,
                item_id,
                payload_size,
                reference,
                payload,
            } => {
                buf.extend_from_slice(&group_id.as_u32().to_le_bytes());
                buf.extend_from_slice(&page_id.as_u64().to_le_bytes());
                buf.extend_from_slice(&item_id.to_le_bytes());
                buf.extend_from_slice(&payload_size.to_le_bytes());
                match reference {
                    Some(ptr) => {
                        buf.push(1);
                        buf.extend_from_slice(&ptr.to_bytes()?);
                    }
                    None => {
                        if payload.len() != *payload_size as usize {
                            return Err(CoreError::invalid_argument(format!(
                                "page update declares {payload_size} bytes but carries {}",
                                payload.len()
                            )));
                        }
                        buf.push(0);
                        buf.extend_from_slice(payload);
                    }
                }
            }

            Self::PageRemove {
                group_id,
                page_id,
                item_id,
            } => {
                buf.extend_from_slice(&group_id.as_u32().to_le_bytes());
                buf.extend_from_slice(&page_id.as_u64().to_le_bytes());
                buf.extend_from_slice(&item_id.to_le_bytes());
            }

            Self::Checkpoint { id, partitions } => {
                buf.extend_from_slice(&id.to_le_bytes());
                let count = u32::try_from(partitions.len())
                    .map_err(|_| CoreError::invalid_argument("too many checkpoint partitions"))?;
                buf.extend_from_slice(&count.to_le_bytes());
                for state in partitions {
                    buf.extend_from_slice(&state.group_id.as_u32().to_le_bytes());
                    buf.extend_from_slice(&state.partition.as_u16().to_le_bytes());
                    put_bytes(buf, &state.counter.encode())?;
                }
            }
        }

        Ok(())
    }

    /// Deserializes a record from its type and payload.
    ///
    /// `at` locates the record for error reporting.
    ///
    /// # Errors
    ///
    /// Returns `WalCorruption` if the payload is short, carries trailing
    /// bytes, or its declared sizes disagree with the bytes present.
    pub fn decode_payload(
        record_type: WalRecordType,
        payload: &[u8],
        at: LogPointer,
    ) -> CoreResult<Self> {
        let mut r = PayloadReader::new(payload, at);

        let record = match record_type {
            WalRecordType::Header => {
                let magic = r.take(4)?;
                if magic != SEGMENT_MAGIC {
                    return Err(r.corruption("bad segment magic"));
                }
                Self::Header {
                    version: r.u16()?,
                }
            }

            WalRecordType::Data => Self::Data {
                group_id: GroupId::new(r.u32()?),
                partition: PartitionId::new(r.u16()?),
                counter: r.u64()?,
                payload: r.sized_bytes()?,
            },

            WalRecordType::PageInsert => Self::PageInsert {
                group_id: GroupId::new(r.u32()?),
                page_id: PageId::new(r.u64()?),
                payload: r.sized_bytes()?,
            },

            WalRecordType::PageUpdate => {
                let group_id = GroupId::new(r.u32()?);
                let page_id = PageId::new(r.u64()?);
                let item_id = r.u16()?;
                let payload_size = r.u32()?;
                let (reference, payload) = match r.u8()? {
                    0 => (None, r.take(payload_size as usize)?.to_vec()),
                    1 => {
                        let ptr = LogPointer::from_bytes(r.take(POINTER_SIZE)?)
                            .map_err(|e| r.corruption(e.to_string()))?;
                        (Some(ptr), Vec::new())
                    }
                    other => {
                        return Err(r.corruption(format!("invalid reference flag {other}")));
                    }
                };
                Self::PageUpdate {
                    group_id,
                    page_id,
                    item_id,
                    payload_size,
                    reference,
                    payload,
                }
            }

            WalRecordType::PageRemove => Self::PageRemove {
                group_id: GroupId::new(r.u32()?),
                page_id: PageId::new(r.u64()?),
                item_id: r.u16()?,
            },

            WalRecordType::Checkpoint => {
                let id = r.u64()?;
                let count = r.u32()? as usize;
                let mut partitions = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    let group_id = GroupId::new(r.u32()?);
                    let partition = PartitionId::new(r.u16()?);
                    let counter = CounterSnapshot::decode(&r.sized_bytes()?)
                        .map_err(|e| r.corruption(e.to_string()))?;
                    partitions.push(PartitionState {
                        group_id,
                        partition,
                        counter,
                    });
                }
                Self::Checkpoint { id, partitions }
            }
        };

        r.finish(record_type)?;
        Ok(record)
    }
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> CoreResult<()> {
    let len = u32::try_from(bytes.len()).map_err(|_| {
        CoreError::invalid_argument(format!("payload too large: {} bytes", bytes.len()))
    })?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Cursor over a record payload that reports short reads as corruption.
struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
    at: LogPointer,
}

impl<'a> PayloadReader<'a> {
    fn new(buf: &'a [u8], at: LogPointer) -> Self {
        Self { buf, pos: 0, at }
    }

    fn corruption(&self, message: impl Into<String>) -> CoreError {
        CoreError::wal_corruption(self.at.index(), u64::from(self.at.offset()), message)
    }

    fn take(&mut self, n: usize) -> CoreResult<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.buf.len());
        let Some(end) = end else {
            return Err(self.corruption(format!(
                "unexpected end of payload: need {n} bytes at {}, have {}",
                self.pos,
                self.buf.len()
            )));
        };
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> CoreResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> CoreResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> CoreResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> CoreResult<u64> {
        let b = self.take(8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(b);
        Ok(u64::from_le_bytes(bytes))
    }

    fn sized_bytes(&mut self) -> CoreResult<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn finish(&self, record_type: WalRecordType) -> CoreResult<()> {
        if self.pos != self.buf.len() {
            return Err(self.corruption(format!(
                "trailing bytes in {record_type:?} record: expected {} bytes, got {}",
                self.pos,
                self.buf.len()
            )));
        }
        Ok(())
    }
}
