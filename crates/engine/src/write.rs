/// Write path: `put()`, `delete()`, `sync()`, and `close()`.
///
/// Every mutation appends a record to the active segment and updates the
/// keydir under the engine's exclusive lock. The active segment rolls
/// *before* the append when it has reached `max_file_size`, so a record
/// never straddles two files.
use keydir::Locator;
use segment::{Record, SegmentFile};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{Engine, EngineError, Inner};

impl Engine {
    /// Inserts or overwrites a key.
    ///
    /// # Errors
    ///
    /// [`EngineError::ReadOnly`] when the engine was opened without
    /// `read_write`; otherwise any I/O error from the append or the optional
    /// fsync.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), EngineError> {
        if !self.options.read_write {
            return Err(EngineError::ReadOnly);
        }
        let mut inner = self.inner.write()?;
        let record = Record::put(key.to_vec(), value.to_vec(), wall_clock_nanos(), 0);
        self.append_record(&mut inner, key, &record)
    }

    /// Deletes a key by appending a tombstone and erasing the keydir entry.
    ///
    /// The tombstone follows the same rolling policy as `put`, so deletes
    /// also seal a full active segment.
    pub fn delete(&self, key: &[u8]) -> Result<(), EngineError> {
        if !self.options.read_write {
            return Err(EngineError::ReadOnly);
        }
        let mut inner = self.inner.write()?;
        let record = Record::delete(key.to_vec(), wall_clock_nanos(), 0);
        self.append_record(&mut inner, key, &record)
    }

    /// Flushes the active segment to disk.
    pub fn sync(&self) -> Result<(), EngineError> {
        let inner = self.inner.write()?;
        if let Some(active) = &inner.active {
            active.sync()?;
        }
        Ok(())
    }

    /// Closes the engine: syncs and closes every segment and drops the
    /// handles. Closing twice is a no-op; reads after close report
    /// `KeyNotFound` and writes report `ReadOnly`.
    pub fn close(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.write()?;
        if let Some(active) = inner.active.take() {
            active.sync()?;
        }
        for seg in inner.segments.values() {
            seg.close()?;
        }
        inner.segments.clear();
        Ok(())
    }

    /// Appends `record` to the active segment (rolling first when full) and
    /// applies it to the keydir. The keydir entry's `size` comes from the
    /// buffer the segment actually wrote — the record is never re-encoded.
    fn append_record(
        &self,
        inner: &mut Inner,
        key: &[u8],
        record: &Record,
    ) -> Result<(), EngineError> {
        self.roll_active_if_full(inner)?;
        let active = match &inner.active {
            Some(seg) => Arc::clone(seg),
            None => return Err(EngineError::ReadOnly),
        };

        let (offset, size) = active.append(record)?;

        if record.is_tombstone() {
            inner.keydir.del(key);
        } else {
            inner.keydir.add(
                key.to_vec(),
                Locator {
                    file_id: active.file_id(),
                    offset,
                    size,
                    timestamp: record.timestamp,
                },
            );
        }

        if self.options.sync_on_put {
            active.sync()?;
        }
        Ok(())
    }

    /// Seals the active segment and opens a successor when the tail has
    /// reached `max_file_size`.
    fn roll_active_if_full(&self, inner: &mut Inner) -> Result<(), EngineError> {
        let full = match &inner.active {
            Some(seg) => seg.len()? >= self.options.max_file_size,
            None => return Err(EngineError::ReadOnly),
        };
        if !full {
            return Ok(());
        }

        if let Some(active) = inner.active.take() {
            active.sync()?;
            active.close()?;
            // the sealed segment stays in `segments` and remains readable
        }

        inner.max_file_id += 1;
        let seg = Arc::new(SegmentFile::open(&self.dir, inner.max_file_id, true)?);
        inner.segments.insert(inner.max_file_id, seg.clone());
        inner.active = Some(seg);
        Ok(())
    }
}

/// Wall-clock nanoseconds since the unix epoch; monotonic enough to order
/// writes from a single writer.
pub(crate) fn wall_clock_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}
