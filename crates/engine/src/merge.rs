/// Merge: rewrites only the live, non-tombstoned records into one fresh
/// segment and discards every prior segment.
///
/// The handoff is crash-safe. The merged segment is written under a `.tmp`
/// name (invisible to directory scans), fsynced, and renamed into place;
/// only then is a sentinel file published naming the merged id, the old
/// segments unlinked, and the sentinel removed. A crash before the sentinel
/// leaves the old segments authoritative; a crash after it is completed by
/// the next open, which deletes every older segment the interrupted merge
/// left behind.
use keydir::{KeyDir, Locator};
use segment::SegmentFile;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::{Engine, EngineError};

/// Sentinel published between writing the merged segment and unlinking the
/// old ones; holds the merged file id in decimal.
pub(crate) const MERGE_SENTINEL: &str = "MERGE";

impl Engine {
    /// Compacts the data directory down to a single segment.
    ///
    /// Holds the engine lock exclusively for the whole pass: no put, get,
    /// or delete overlaps a merge. If writing the merged segment fails
    /// mid-way the old segments and in-memory state are untouched; a retry
    /// starts over on a truncated temp file.
    pub fn merge(&self) -> Result<(), EngineError> {
        if !self.options.read_write {
            return Err(EngineError::ReadOnly);
        }
        let mut inner = self.inner.write()?;

        let merged_id = inner.max_file_id + 1;
        let replacement = SegmentFile::create_replacement(&self.dir, merged_id)?;

        let mut merged_keydir = KeyDir::new();
        for (key, locator) in inner.keydir.iter() {
            let Some(seg) = inner.segments.get(&locator.file_id) else {
                continue;
            };
            let Ok(record) = seg.read_at(locator.offset, locator.size) else {
                continue;
            };
            if record.is_tombstone() {
                continue;
            }

            let (offset, size) = replacement.append(&record)?;
            merged_keydir.add(
                key.clone(),
                Locator {
                    file_id: merged_id,
                    offset,
                    size,
                    timestamp: record.timestamp,
                },
            );
        }

        // Durable handoff: publish the merged file, then the sentinel.
        replacement.publish()?;
        let merged = Arc::new(SegmentFile::open(&self.dir, merged_id, true)?);
        write_merge_sentinel(&self.dir, merged_id)?;

        for seg in inner.segments.values() {
            seg.close()?;
            fs::remove_file(seg.path())?;
        }
        fs::remove_file(self.dir.join(MERGE_SENTINEL))?;

        let mut segments = BTreeMap::new();
        segments.insert(merged_id, Arc::clone(&merged));
        inner.segments = segments;
        inner.keydir = merged_keydir;
        inner.max_file_id = merged_id;
        inner.active = Some(merged);
        Ok(())
    }
}

/// Writes the merge sentinel atomically: temp file, fsync, rename.
fn write_merge_sentinel(dir: &Path, merged_id: i64) -> Result<(), EngineError> {
    let tmp_path = dir.join(format!("{}.tmp", MERGE_SENTINEL));
    {
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        writeln!(f, "{}", merged_id)?;
        f.flush()?;
        f.sync_all()?;
    }
    fs::rename(&tmp_path, dir.join(MERGE_SENTINEL))?;
    Ok(())
}
