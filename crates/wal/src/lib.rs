//! # WAL — Write-Ahead Log
//!
//! Provides the durability boundary for CinderKV transactions. A commit
//! frames its write-set as `TxnBegin || body… || TxnEnd`, appends every
//! record to the WAL, and fsyncs **before** the data engine is touched. On
//! restart, [`Wal::read_all`] yields exactly the records of fully framed
//! transactions, so a crash anywhere between the fsync and the engine apply
//! is repaired by replay.
//!
//! ## Frame Format
//!
//! ```text
//! [length: u32 BE][encoded record bytes...]
//! ```
//!
//! The payload is the segment record encoding (29-byte header + key +
//! value), CRC included, so the WAL inherits the codec's torn-write
//! detection.
//!
//! ## Example
//!
//! ```rust,no_run
//! use segment::Record;
//! use wal::Wal;
//!
//! let wal = Wal::open("data/wal".as_ref()).unwrap();
//! wal.append(&Record::txn_begin(7)).unwrap();
//! wal.append(&Record::put(b"k".to_vec(), b"v".to_vec(), 7, 7)).unwrap();
//! wal.append(&Record::txn_end(7)).unwrap();
//! wal.sync().unwrap();
//! ```

use byteorder::{BigEndian, ByteOrder};
use segment::{Op, Record, SegmentError};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use thiserror::Error;

/// Name of the log file inside the WAL directory.
pub const WAL_FILE_NAME: &str = "wal.log";

/// Safety cap on a single frame; anything larger is treated as corruption.
const MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A fully framed record failed to decode (CRC or structure).
    #[error("corrupt wal record: {0}")]
    Corrupt(#[from] SegmentError),

    /// A frame header declared an absurd length.
    #[error("wal frame too large: {0} bytes")]
    FrameTooLarge(u32),

    /// A lock was poisoned by a thread that panicked while holding it.
    #[error("lock poisoned")]
    LockPoisoned,
}

impl<T> From<std::sync::PoisonError<T>> for WalError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        WalError::LockPoisoned
    }
}

/// Append-only write-ahead log.
///
/// One mutex serializes appends, replay, and truncation; the file is shared
/// by nothing else. Appends build the whole frame in a scratch buffer and
/// hand it to the kernel in a single `write_all`, so a frame is never
/// interleaved with another writer's bytes.
pub struct Wal {
    inner: Mutex<WalInner>,
}

struct WalInner {
    file: File,
    /// Reusable scratch buffer to avoid allocation on every append.
    buf: Vec<u8>,
}

impl Wal {
    /// Opens (or creates) the log at `<dir>/wal.log`, creating `dir` as
    /// needed. Existing frames are preserved; new appends go to the end.
    pub fn open(dir: &Path) -> Result<Self, WalError> {
        std::fs::create_dir_all(dir)?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(dir.join(WAL_FILE_NAME))?;
        Ok(Self {
            inner: Mutex::new(WalInner {
                file,
                buf: Vec::with_capacity(256),
            }),
        })
    }

    /// Serializes `record` and appends one frame to the log.
    pub fn append(&self, record: &Record) -> Result<(), WalError> {
        let mut guard = self.inner.lock()?;
        let WalInner { file, buf } = &mut *guard;
        let encoded = record.encode();

        buf.clear();
        buf.resize(4, 0);
        BigEndian::write_u32(&mut buf[0..4], encoded.len() as u32);
        buf.extend_from_slice(&encoded);

        file.write_all(buf)?;
        file.flush()?;
        Ok(())
    }

    /// Forces all appended frames to durable storage via `fsync`.
    pub fn sync(&self) -> Result<(), WalError> {
        let mut inner = self.inner.lock()?;
        inner.file.flush()?;
        inner.file.sync_all()?;
        Ok(())
    }

    /// Replays the log from the start and returns the logically committed
    /// records, in log order.
    ///
    /// # Replay contract
    ///
    /// * `TxnBegin` opens a transaction buffer (discarding any previous
    ///   unterminated one).
    /// * `TxnEnd` emits the buffered records.
    /// * A record outside any transaction is emitted immediately
    ///   (non-transactional legacy write).
    /// * Records after a `TxnBegin` with no matching `TxnEnd` are discarded —
    ///   this is the atomicity boundary for crash recovery.
    /// * A truncated trailing frame (torn append) ends replay cleanly with
    ///   everything emitted so far.
    ///
    /// # Errors
    ///
    /// A CRC or structure failure inside a complete frame, an absurd frame
    /// length, or any I/O error other than a torn tail.
    pub fn read_all(&self) -> Result<Vec<Record>, WalError> {
        let mut inner = self.inner.lock()?;
        inner.file.seek(SeekFrom::Start(0))?;

        let mut committed = Vec::new();
        let mut txn_buffer: Vec<Record> = Vec::new();
        let mut in_txn = false;

        loop {
            let mut len_buf = [0u8; 4];
            match read_exact_or_eof(&mut inner.file, &mut len_buf)? {
                ReadOutcome::Eof => break,
                ReadOutcome::Full => {}
            }
            let len = BigEndian::read_u32(&len_buf);
            if len > MAX_FRAME_SIZE {
                return Err(WalError::FrameTooLarge(len));
            }

            let mut frame = vec![0u8; len as usize];
            match read_exact_or_eof(&mut inner.file, &mut frame)? {
                // torn tail: the frame header made it to disk but the body
                // did not; everything before it is still good
                ReadOutcome::Eof => break,
                ReadOutcome::Full => {}
            }

            let record = Record::decode(&frame)?;
            match record.op {
                Op::TxnBegin => {
                    in_txn = true;
                    txn_buffer.clear();
                }
                Op::TxnEnd => {
                    if in_txn {
                        committed.append(&mut txn_buffer);
                        in_txn = false;
                    }
                }
                _ => {
                    if in_txn {
                        txn_buffer.push(record);
                    } else {
                        committed.push(record);
                    }
                }
            }
        }

        // Seek back to the end so subsequent appends are well-positioned
        // even on platforms where append mode does not imply it.
        inner.file.seek(SeekFrom::End(0))?;
        Ok(committed)
    }

    /// Discards all frames: truncates the file and rewinds to offset 0.
    pub fn clear(&self) -> Result<(), WalError> {
        let mut inner = self.inner.lock()?;
        inner.file.set_len(0)?;
        inner.file.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    /// Flushes the log to disk. The descriptor is released on drop.
    pub fn close(&self) -> Result<(), WalError> {
        self.sync()
    }
}

enum ReadOutcome {
    Full,
    Eof,
}

/// `read_exact` that reports a clean or mid-buffer EOF instead of failing,
/// so replay can treat a torn tail as the end of the log.
fn read_exact_or_eof(file: &mut File, buf: &mut [u8]) -> Result<ReadOutcome, WalError> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => return Ok(ReadOutcome::Eof),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(WalError::Io(e)),
        }
    }
    Ok(ReadOutcome::Full)
}
