//! # Segment — record codec and append-only data files
//!
//! The on-disk substrate of the CinderKV engine. A data directory holds a
//! sequence of segment files (`000000001.data`, `000000002.data`, …), each a
//! concatenation of self-describing binary records. Exactly one segment is
//! writable at a time; the rest are sealed and only ever read at known
//! offsets.
//!
//! ## Binary Record Format
//!
//! ```text
//! [crc32: u32][type: u8][timestamp: i64][txn_id: i64][key_len: u32][value_len: u32][key][value]
//! ```
//!
//! All integers are big-endian. The fixed header is 29 bytes; the CRC-32
//! (IEEE) covers everything after itself, so a torn or bit-flipped record is
//! rejected on decode.
//!
//! ## Example
//!
//! ```rust,no_run
//! use segment::{Record, SegmentFile};
//!
//! let seg = SegmentFile::open("data".as_ref(), 1, true).unwrap();
//! let rec = Record::put(b"hello".to_vec(), b"world".to_vec(), 42, 0);
//! let (offset, len) = seg.append(&rec).unwrap();
//! assert_eq!(seg.read_at(offset, len).unwrap(), rec);
//! ```

mod file;
mod record;

pub use file::{data_file_name, SegmentFile, DATA_FILE_SUFFIX};
pub use record::{Op, Record, HEADER_SIZE};

use std::io;
use thiserror::Error;

/// Errors produced by the record codec and segment file I/O.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// The stored CRC-32 does not match the record bytes.
    #[error("invalid checksum")]
    InvalidChecksum,

    /// The buffer is too short, its lengths are inconsistent, or the type
    /// tag is unknown.
    #[error("invalid entry")]
    InvalidEntry,

    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A lock was poisoned by a thread that panicked while holding it.
    #[error("lock poisoned")]
    LockPoisoned,
}

impl<T> From<std::sync::PoisonError<T>> for SegmentError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        SegmentError::LockPoisoned
    }
}

#[cfg(test)]
mod tests;
