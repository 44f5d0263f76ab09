use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::record::{Record, HEADER_SIZE};
use crate::SegmentError;

/// Filename suffix shared by every segment file.
pub const DATA_FILE_SUFFIX: &str = ".data";

/// Builds the canonical filename for a segment id, e.g. `000000017.data`.
///
/// Zero-padding keeps lexicographic directory order equal to numeric id
/// order.
#[must_use]
pub fn data_file_name(file_id: i64) -> String {
    format!("{:09}{}", file_id, DATA_FILE_SUFFIX)
}

/// An append-only segment file.
///
/// Appends are serialized by an internal mutex guarding the write offset;
/// reads go through positional I/O (`pread`) and never take that lock, so
/// concurrent readers do not contend with the writer or each other.
pub struct SegmentFile {
    path: PathBuf,
    file: File,
    file_id: i64,
    writable: bool,
    /// Next append position; equals the file length on the happy path.
    write_off: Mutex<u64>,
    closed: AtomicBool,
}

impl SegmentFile {
    /// Opens (creating if `writable`) the segment `file_id` inside `dir`.
    ///
    /// The write offset starts at the current end of file, so reopening a
    /// writable segment resumes appending after its existing records.
    pub fn open(dir: &Path, file_id: i64, writable: bool) -> Result<Self, SegmentError> {
        Self::open_at(dir.join(data_file_name(file_id)), file_id, writable)
    }

    /// Creates a replacement segment at `<id>.data.tmp`, truncating any
    /// leftover from an earlier failed attempt. Used by merge; the file is
    /// invisible to directory scans until [`SegmentFile::publish`] renames
    /// it into place.
    pub fn create_replacement(dir: &Path, file_id: i64) -> Result<Self, SegmentError> {
        let path = dir.join(format!("{}.tmp", data_file_name(file_id)));
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&path)?;
        Ok(Self {
            path,
            file,
            file_id,
            writable: true,
            write_off: Mutex::new(0),
            closed: AtomicBool::new(false),
        })
    }

    fn open_at(path: PathBuf, file_id: i64, writable: bool) -> Result<Self, SegmentError> {
        let file = if writable {
            OpenOptions::new().create(true).read(true).write(true).open(&path)?
        } else {
            OpenOptions::new().read(true).open(&path)?
        };
        let write_off = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            file_id,
            writable,
            write_off: Mutex::new(write_off),
            closed: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn file_id(&self) -> i64 {
        self.file_id
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current tail of the file, i.e. the offset the next append will use.
    pub fn len(&self) -> Result<u64, SegmentError> {
        Ok(*self.write_off.lock()?)
    }

    /// Appends an encoded record, returning `(offset, encoded_len)`.
    ///
    /// The offset is the position the record starts at (pre-append tail);
    /// the length comes from the buffer actually written, so callers can
    /// index the record without re-encoding it.
    pub fn append(&self, record: &Record) -> Result<(u64, u64), SegmentError> {
        let buf = record.encode();
        let mut write_off = self.write_off.lock()?;
        let offset = *write_off;
        self.file.write_all_at(&buf, offset)?;
        *write_off += buf.len() as u64;
        Ok((offset, buf.len() as u64))
    }

    /// Reads and decodes the record spanning `[offset, offset + size)`.
    pub fn read_at(&self, offset: u64, size: u64) -> Result<Record, SegmentError> {
        let mut buf = vec![0u8; size as usize];
        self.file.read_exact_at(&mut buf, offset)?;
        Record::decode(&buf)
    }

    /// Reads the record starting at `offset` without knowing its size in
    /// advance: the fixed header is read first to learn the span, then the
    /// full record is decoded. Returns the record and its encoded length.
    ///
    /// This is the primitive behind the engine's index-rebuild walk.
    pub fn read_span(&self, offset: u64) -> Result<(Record, u64), SegmentError> {
        let mut header = [0u8; HEADER_SIZE];
        self.file.read_exact_at(&mut header, offset)?;
        let size = Record::span_len(&header)? as u64;
        let record = self.read_at(offset, size)?;
        Ok((record, size))
    }

    /// Flushes OS buffers to disk.
    pub fn sync(&self) -> Result<(), SegmentError> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Renames a replacement segment from its `.tmp` name to the canonical
    /// `<id>.data` name, fsyncing first so the rename publishes a complete
    /// file. Consumes the handle; reopen through [`SegmentFile::open`].
    pub fn publish(self) -> Result<(), SegmentError> {
        self.file.sync_all()?;
        let final_path = self
            .path
            .with_file_name(data_file_name(self.file_id));
        std::fs::rename(&self.path, final_path)?;
        Ok(())
    }

    /// Marks the segment closed, flushing a writable file once. Closing an
    /// already-closed segment is a no-op; the descriptor itself is released
    /// when the value is dropped.
    pub fn close(&self) -> Result<(), SegmentError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if self.writable {
            self.file.sync_all()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for SegmentFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self.write_off.lock().map(|off| *off).unwrap_or(0);
        f.debug_struct("SegmentFile")
            .field("file_id", &self.file_id)
            .field("path", &self.path)
            .field("writable", &self.writable)
            .field("len", &len)
            .finish()
    }
}
