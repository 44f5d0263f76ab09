/// Read path: `get()`, `list_keys()`, and `fold()`.
///
/// All three take the engine lock shared and resolve keydir entries to
/// positional segment reads, so concurrent readers proceed in parallel.
use segment::Op;

use crate::{Engine, EngineError};

impl Engine {
    /// Looks up the live value for a key.
    ///
    /// A keydir miss, a keydir entry pointing at a segment that no longer
    /// exists (stale after merge), or a tombstone record all surface as
    /// [`EngineError::KeyNotFound`]. Read failures from the segment layer
    /// propagate verbatim.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>, EngineError> {
        let inner = self.inner.read()?;

        let locator = inner.keydir.find(key).ok_or(EngineError::KeyNotFound)?;
        let seg = inner
            .segments
            .get(&locator.file_id)
            .ok_or(EngineError::KeyNotFound)?;

        let record = seg.read_at(locator.offset, locator.size)?;
        match record.op {
            Op::Put { value, .. } => Ok(value),
            // a tombstone behind a live keydir entry means the index is
            // stale; report absence rather than the marker
            _ => Err(EngineError::KeyNotFound),
        }
    }

    /// Snapshot of every live key. Callers must not rely on any ordering.
    pub fn list_keys(&self) -> Result<Vec<Vec<u8>>, EngineError> {
        Ok(self.inner.read()?.keydir.keys())
    }

    /// Folds `f` over every live `(key, value)` pair.
    ///
    /// Tombstones are never exposed, and entries whose segment read fails
    /// are skipped rather than aborting the fold.
    pub fn fold<B, F>(&self, mut f: F, init: B) -> Result<B, EngineError>
    where
        F: FnMut(&[u8], &[u8], B) -> B,
    {
        let inner = self.inner.read()?;
        let mut acc = init;

        for (key, locator) in inner.keydir.iter() {
            let Some(seg) = inner.segments.get(&locator.file_id) else {
                continue;
            };
            let Ok(record) = seg.read_at(locator.offset, locator.size) else {
                continue;
            };
            if let Op::Put { value, .. } = &record.op {
                acc = f(key, value, acc);
            }
        }
        Ok(acc)
    }
}
