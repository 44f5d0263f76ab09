//! # Engine — CinderKV Storage Engine
//!
//! The append-only data-file engine: a directory of segment files, an
//! in-memory keydir index, and the machinery that keeps them consistent.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │                   ENGINE                      │
//! │                                               │
//! │ write.rs → roll active segment if full        │
//! │              |                                │
//! │              v                                │
//! │           append record → update keydir       │
//! │                                               │
//! │ read.rs  → keydir lookup → positional read    │
//! │                                               │
//! │ merge.rs → rewrite live records → new segment │
//! │            (sentinel handoff, then unlink)    │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module         | Purpose                                              |
//! |----------------|------------------------------------------------------|
//! | [`lib.rs`]     | `Engine` struct, options, `open`, accessors, `Drop`  |
//! | [`recovery`]   | Index rebuild scan, tmp cleanup, merge completion    |
//! | [`write`]      | `put()`, `delete()`, `sync()`, `close()`             |
//! | [`read`]       | `get()`, `list_keys()`, `fold()`                     |
//! | [`merge`]      | Compaction into a single fresh segment               |
//!
//! ## Crash Safety
//!
//! Appends are length-exact; a record never straddles two files because the
//! active segment rolls **before** the write. Merge publishes its output
//! atomically (temp file + rename) and hands off through a sentinel file, so
//! a crash at any point leaves either the old segments or the merged one
//! authoritative — never a mix. Index rebuild re-verifies every record's CRC
//! and refuses to open on corruption.

mod merge;
mod read;
mod recovery;
mod write;

use keydir::KeyDir;
use segment::{SegmentError, SegmentFile};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Default cap on a segment file before the engine rolls to a new one.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 2 * 1024 * 1024;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Options {
    /// Whether the engine accepts writes. A read-only engine never creates
    /// an active segment.
    pub read_write: bool,
    /// If `true`, every `put`/`delete` fsyncs the active segment before
    /// returning.
    pub sync_on_put: bool,
    /// Size threshold at which the active segment is sealed and a new one
    /// becomes active.
    pub max_file_size: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            read_write: false,
            sync_on_put: false,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The key has no live value.
    #[error("key not found")]
    KeyNotFound,

    /// A mutation was attempted on a read-only engine.
    #[error("engine is read-only")]
    ReadOnly,

    /// A segment contained a structurally impossible span (e.g. a record
    /// header pointing past the end of the file).
    #[error("corrupt segment {file_id} at offset {offset}")]
    Corrupt { file_id: i64, offset: u64 },

    /// Codec or checksum failure from the segment layer.
    #[error(transparent)]
    Segment(#[from] SegmentError),

    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A lock was poisoned by a thread that panicked while holding it.
    #[error("lock poisoned")]
    LockPoisoned,
}

impl<T> From<std::sync::PoisonError<T>> for EngineError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        EngineError::LockPoisoned
    }
}

/// The storage engine: segment files plus the keydir that indexes them.
///
/// All state sits behind one reader/writer lock, so the engine is shared by
/// reference: lookups take the lock shared, mutations and merge take it
/// exclusive. Within a segment, appends are additionally serialized by the
/// segment's own mutex and reads are positional.
pub struct Engine {
    dir: PathBuf,
    options: Options,
    inner: RwLock<Inner>,
}

pub(crate) struct Inner {
    /// All open segments by file id; ascending order is replay order.
    pub(crate) segments: BTreeMap<i64, Arc<SegmentFile>>,
    /// The one writable segment, also present in `segments`. `None` when
    /// the engine is read-only or closed.
    pub(crate) active: Option<Arc<SegmentFile>>,
    pub(crate) keydir: KeyDir,
    pub(crate) max_file_id: i64,
}

impl Engine {
    /// Opens the engine over `dir`, creating the directory if needed and
    /// rebuilding the keydir from every segment on disk.
    ///
    /// # Steps
    ///
    /// 1. `mkdir -p dir`, clean up leftover `.data.tmp` files, and complete
    ///    any merge that crashed after its sentinel was published.
    /// 2. Open every `*.data` file read-only, ordered by file id.
    /// 3. Walk each segment from offset 0, replaying puts and tombstones
    ///    into the keydir. Any CRC failure aborts the open.
    /// 4. When opened read-write, create a fresh active segment with id
    ///    `max_file_id + 1`.
    pub fn open<P: AsRef<Path>>(dir: P, options: Options) -> Result<Self, EngineError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        Self::cleanup_tmp_files(&dir);
        Self::finish_interrupted_merge(&dir)?;

        let mut segments = BTreeMap::new();
        let mut max_file_id = 0i64;

        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stem) = name.strip_suffix(segment::DATA_FILE_SUFFIX) else {
                continue;
            };
            let Ok(file_id) = stem.parse::<i64>() else { continue };

            let seg = Arc::new(SegmentFile::open(&dir, file_id, false)?);
            max_file_id = max_file_id.max(file_id);
            segments.insert(file_id, seg);
        }

        // Replay order matches write order, so later puts win and deletes
        // are honored.
        let mut keydir = KeyDir::new();
        for seg in segments.values() {
            Self::scan_segment(seg, &mut keydir)?;
        }

        let mut active = None;
        if options.read_write {
            max_file_id += 1;
            let seg = Arc::new(SegmentFile::open(&dir, max_file_id, true)?);
            segments.insert(max_file_id, seg.clone());
            active = Some(seg);
        }

        Ok(Self {
            dir,
            options,
            inner: RwLock::new(Inner {
                segments,
                active,
                keydir,
                max_file_id,
            }),
        })
    }

    /// The data directory this engine owns.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns `true` when the engine accepts writes.
    #[must_use]
    pub fn is_read_write(&self) -> bool {
        self.options.read_write
    }

    /// Number of live keys in the index.
    pub fn key_count(&self) -> Result<usize, EngineError> {
        Ok(self.inner.read()?.keydir.len())
    }

    /// Number of open segment files, the active one included.
    pub fn segment_count(&self) -> Result<usize, EngineError> {
        Ok(self.inner.read()?.segments.len())
    }

    /// Highest segment file id in use.
    pub fn max_file_id(&self) -> Result<i64, EngineError> {
        Ok(self.inner.read()?.max_file_id)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Engine");
        s.field("dir", &self.dir)
            .field("read_write", &self.options.read_write)
            .field("sync_on_put", &self.options.sync_on_put)
            .field("max_file_size", &self.options.max_file_size);
        match self.inner.read() {
            Ok(inner) => {
                s.field("segments", &inner.segments.len())
                    .field("keys", &inner.keydir.len())
                    .field("max_file_id", &inner.max_file_id);
            }
            Err(_) => {
                s.field("state", &"<lock poisoned>");
            }
        }
        s.finish()
    }
}

/// Best-effort flush on drop.
///
/// Errors are ignored because Drop cannot propagate them; callers that need
/// certainty use [`Engine::close`].
impl Drop for Engine {
    fn drop(&mut self) {
        if let Ok(inner) = self.inner.get_mut() {
            if let Some(active) = &inner.active {
                let _ = active.sync();
            }
        }
    }
}

#[cfg(test)]
mod tests;
