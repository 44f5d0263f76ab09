use byteorder::{BigEndian, ByteOrder};
use crc32fast::Hasher as Crc32;

use crate::SegmentError;

/// Fixed record header size in bytes:
/// `crc32(4) + type(1) + timestamp(8) + txn_id(8) + key_len(4) + value_len(4)`.
pub const HEADER_SIZE: usize = 29;

const TYPE_PUT: u8 = 0;
const TYPE_DELETE: u8 = 1;
const TYPE_TXN_BEGIN: u8 = 2;
const TYPE_TXN_END: u8 = 3;

/// The operation a record describes.
///
/// Only `Put` and `Delete` carry key bytes; the transaction markers exist
/// solely to frame a write-set in the WAL and never reach a data segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Insert or overwrite a key.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Tombstone marking logical absence of a key.
    Delete { key: Vec<u8> },
    /// Opens a transaction frame in the WAL.
    TxnBegin,
    /// Closes a transaction frame in the WAL.
    TxnEnd,
}

/// A single self-describing record.
///
/// `txn_id` is 0 for non-transactional engine writes; transactional records
/// carry the owning transaction's start timestamp in both fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub timestamp: i64,
    pub txn_id: i64,
    pub op: Op,
}

impl Record {
    pub fn put(key: Vec<u8>, value: Vec<u8>, timestamp: i64, txn_id: i64) -> Self {
        Self {
            timestamp,
            txn_id,
            op: Op::Put { key, value },
        }
    }

    pub fn delete(key: Vec<u8>, timestamp: i64, txn_id: i64) -> Self {
        Self {
            timestamp,
            txn_id,
            op: Op::Delete { key },
        }
    }

    pub fn txn_begin(txn_id: i64) -> Self {
        Self {
            timestamp: txn_id,
            txn_id,
            op: Op::TxnBegin,
        }
    }

    pub fn txn_end(txn_id: i64) -> Self {
        Self {
            timestamp: txn_id,
            txn_id,
            op: Op::TxnEnd,
        }
    }

    /// The record's key bytes (empty for transaction markers).
    #[must_use]
    pub fn key(&self) -> &[u8] {
        match &self.op {
            Op::Put { key, .. } | Op::Delete { key } => key,
            Op::TxnBegin | Op::TxnEnd => &[],
        }
    }

    /// Returns `true` for `Delete` records.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        matches!(self.op, Op::Delete { .. })
    }

    fn type_code(&self) -> u8 {
        match self.op {
            Op::Put { .. } => TYPE_PUT,
            Op::Delete { .. } => TYPE_DELETE,
            Op::TxnBegin => TYPE_TXN_BEGIN,
            Op::TxnEnd => TYPE_TXN_END,
        }
    }

    /// Total encoded size of this record, header included.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        let (key_len, value_len) = match &self.op {
            Op::Put { key, value } => (key.len(), value.len()),
            Op::Delete { key } => (key.len(), 0),
            Op::TxnBegin | Op::TxnEnd => (0, 0),
        };
        HEADER_SIZE + key_len + value_len
    }

    /// Serializes the record into a freshly allocated buffer.
    ///
    /// The CRC is computed last, over everything after the CRC field itself,
    /// so decoders can detect torn writes anywhere in the payload.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let (key, value): (&[u8], &[u8]) = match &self.op {
            Op::Put { key, value } => (key, value),
            Op::Delete { key } => (key, &[]),
            Op::TxnBegin | Op::TxnEnd => (&[], &[]),
        };

        let mut buf = vec![0u8; HEADER_SIZE + key.len() + value.len()];
        buf[4] = self.type_code();
        BigEndian::write_i64(&mut buf[5..13], self.timestamp);
        BigEndian::write_i64(&mut buf[13..21], self.txn_id);
        BigEndian::write_u32(&mut buf[21..25], key.len() as u32);
        BigEndian::write_u32(&mut buf[25..29], value.len() as u32);
        buf[HEADER_SIZE..HEADER_SIZE + key.len()].copy_from_slice(key);
        buf[HEADER_SIZE + key.len()..].copy_from_slice(value);

        let mut hasher = Crc32::new();
        hasher.update(&buf[4..]);
        BigEndian::write_u32(&mut buf[0..4], hasher.finalize());
        buf
    }

    /// Decodes a record from a buffer holding exactly one encoded record.
    ///
    /// # Errors
    ///
    /// * [`SegmentError::InvalidEntry`] — buffer shorter than the fixed
    ///   header, lengths inconsistent with the buffer, an unknown type tag,
    ///   or a marker/tombstone carrying bytes it must not.
    /// * [`SegmentError::InvalidChecksum`] — CRC mismatch.
    pub fn decode(buf: &[u8]) -> Result<Record, SegmentError> {
        if buf.len() < HEADER_SIZE {
            return Err(SegmentError::InvalidEntry);
        }

        let stored_crc = BigEndian::read_u32(&buf[0..4]);
        let mut hasher = Crc32::new();
        hasher.update(&buf[4..]);
        if hasher.finalize() != stored_crc {
            return Err(SegmentError::InvalidChecksum);
        }

        let type_code = buf[4];
        let timestamp = BigEndian::read_i64(&buf[5..13]);
        let txn_id = BigEndian::read_i64(&buf[13..21]);
        let key_len = BigEndian::read_u32(&buf[21..25]) as usize;
        let value_len = BigEndian::read_u32(&buf[25..29]) as usize;

        if HEADER_SIZE + key_len + value_len != buf.len() {
            return Err(SegmentError::InvalidEntry);
        }

        let key = buf[HEADER_SIZE..HEADER_SIZE + key_len].to_vec();
        let value = buf[HEADER_SIZE + key_len..].to_vec();

        let op = match type_code {
            TYPE_PUT => Op::Put { key, value },
            TYPE_DELETE => {
                if value_len != 0 {
                    return Err(SegmentError::InvalidEntry);
                }
                Op::Delete { key }
            }
            TYPE_TXN_BEGIN | TYPE_TXN_END => {
                if key_len != 0 || value_len != 0 {
                    return Err(SegmentError::InvalidEntry);
                }
                if type_code == TYPE_TXN_BEGIN {
                    Op::TxnBegin
                } else {
                    Op::TxnEnd
                }
            }
            _ => return Err(SegmentError::InvalidEntry),
        };

        Ok(Record {
            timestamp,
            txn_id,
            op,
        })
    }

    /// Computes the full span of the record whose header starts `buf`, for
    /// streaming scans that read the header before the payload.
    ///
    /// The CRC cannot be verified yet at this point; callers must re-decode
    /// the full span.
    pub fn span_len(buf: &[u8]) -> Result<usize, SegmentError> {
        if buf.len() < HEADER_SIZE {
            return Err(SegmentError::InvalidEntry);
        }
        let key_len = BigEndian::read_u32(&buf[21..25]) as usize;
        let value_len = BigEndian::read_u32(&buf[25..29]) as usize;
        Ok(HEADER_SIZE + key_len + value_len)
    }
}
