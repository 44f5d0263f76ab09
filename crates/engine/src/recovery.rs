/// Cold-start helpers: the index-rebuild scan, leftover temp-file cleanup,
/// and completion of a merge that crashed after its sentinel was published.
use keydir::{KeyDir, Locator};
use segment::{Op, SegmentError, SegmentFile};
use std::fs;
use std::io;
use std::path::Path;

use crate::merge::MERGE_SENTINEL;
use crate::{Engine, EngineError};

impl Engine {
    /// Walks a segment from offset 0 and replays every record into the
    /// keydir: puts insert or overwrite, tombstones erase. Transaction
    /// markers never reach data segments and are ignored defensively.
    ///
    /// # Errors
    ///
    /// * [`EngineError::Corrupt`] — a record header points past the end of
    ///   the file (torn append).
    /// * [`EngineError::Segment`] — CRC or structure failure; fatal to the
    ///   open, per the no-partial-records invariant.
    pub(crate) fn scan_segment(seg: &SegmentFile, keydir: &mut KeyDir) -> Result<(), EngineError> {
        let file_id = seg.file_id();
        let len = seg.len()?;
        let mut offset = 0u64;

        while offset < len {
            let (record, span) = seg.read_span(offset).map_err(|e| match e {
                SegmentError::Io(ref io_err) if io_err.kind() == io::ErrorKind::UnexpectedEof => {
                    EngineError::Corrupt { file_id, offset }
                }
                other => EngineError::from(other),
            })?;

            match &record.op {
                Op::Put { key, .. } => keydir.add(
                    key.clone(),
                    Locator {
                        file_id,
                        offset,
                        size: span,
                        timestamp: record.timestamp,
                    },
                ),
                Op::Delete { key } => {
                    keydir.del(key);
                }
                Op::TxnBegin | Op::TxnEnd => {}
            }

            offset += span;
        }
        Ok(())
    }

    /// Removes leftover `.data.tmp` files from merges that died before
    /// publishing. Best effort: an unremovable leftover only wastes space.
    pub(crate) fn cleanup_tmp_files(dir: &Path) {
        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    if name.ends_with(".data.tmp") {
                        let _ = fs::remove_file(&path);
                    }
                }
            }
        }
    }

    /// Completes a merge that crashed between sentinel publication and old
    /// segment removal: every `*.data` file older than the sentinel's id is
    /// a pre-merge leftover and is deleted, then the sentinel goes away.
    pub(crate) fn finish_interrupted_merge(dir: &Path) -> Result<(), EngineError> {
        let sentinel = dir.join(MERGE_SENTINEL);
        if !sentinel.exists() {
            return Ok(());
        }

        let contents = fs::read_to_string(&sentinel)?;
        let Ok(merged_id) = contents.trim().parse::<i64>() else {
            // unreadable sentinel: the merge never got far enough to matter
            fs::remove_file(&sentinel)?;
            return Ok(());
        };

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stem) = name.strip_suffix(segment::DATA_FILE_SUFFIX) else {
                continue;
            };
            let Ok(file_id) = stem.parse::<i64>() else { continue };
            if file_id < merged_id {
                fs::remove_file(entry.path())?;
            }
        }

        fs::remove_file(&sentinel)?;
        Ok(())
    }
}
