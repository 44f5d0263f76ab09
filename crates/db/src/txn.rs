/// Transactions: a local write-set plus MVCC versions, made durable and
/// visible by a strictly ordered commit.
use segment::Record;
use std::collections::BTreeMap;

use crate::mvcc::Stored;
use crate::{Db, DbError};

/// A read-write transaction over a [`Db`].
///
/// Writes are staged locally and mirrored into the MVCC table as
/// uncommitted versions, so the transaction reads its own writes while
/// nobody else can. Nothing touches the WAL or the engine until
/// [`Transaction::commit`].
pub struct Transaction<'db> {
    db: &'db Db,
    /// Staged writes; `None` marks a delete.
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    start_ts: i64,
    committed: bool,
}

impl<'db> Transaction<'db> {
    pub(crate) fn new(db: &'db Db, start_ts: i64) -> Self {
        Self {
            db,
            writes: BTreeMap::new(),
            start_ts,
            committed: false,
        }
    }

    /// The snapshot timestamp reads use as their visibility cutoff; also
    /// the `txn_id` stamped on every record this transaction logs.
    #[must_use]
    pub fn start_ts(&self) -> i64 {
        self.start_ts
    }

    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Stages a write, visible to this transaction immediately.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), DbError> {
        self.writes.insert(key.to_vec(), Some(value.to_vec()));
        self.db
            .mvcc
            .write(key, Stored::Value(value.to_vec()), self.start_ts)
    }

    /// Stages a delete, visible to this transaction immediately.
    pub fn delete(&mut self, key: &[u8]) -> Result<(), DbError> {
        self.writes.insert(key.to_vec(), None);
        self.db.mvcc.write(key, Stored::Tombstone, self.start_ts)
    }

    /// Reads a key at this transaction's snapshot: own staged writes first,
    /// then the newest committed MVCC version at or before `start_ts`, then
    /// the engine.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>, DbError> {
        if let Some(staged) = self.writes.get(key) {
            return staged.clone().ok_or(DbError::KeyNotFound);
        }

        match self.db.mvcc.read(key, self.start_ts)? {
            Some(Stored::Value(value)) => Ok(value),
            // a committed tombstone at this snapshot means the key was
            // deleted before we started
            Some(Stored::Tombstone) => Err(DbError::KeyNotFound),
            None => self.db.engine_get(key),
        }
    }

    /// Commits the transaction.
    ///
    /// # Ordered phases
    ///
    /// 1. Frame the write-set into the WAL: `TxnBegin`, one record per
    ///    staged write, `TxnEnd`.
    /// 2. `wal.sync()` — the durability boundary. A crash after this point
    ///    is repaired by replay on the next open.
    /// 3. Apply each write to the engine and the membership filter.
    /// 4. `engine.sync()`.
    /// 5. Flip the MVCC versions visible and drop stale uncommitted ones.
    ///
    /// Any failure short-circuits with the transaction still uncommitted;
    /// readers never see a partially applied commit because visibility only
    /// flips in the final phase.
    pub fn commit(&mut self) -> Result<(), DbError> {
        if self.committed {
            return Err(DbError::AlreadyCommitted);
        }

        self.db.wal.append(&Record::txn_begin(self.start_ts))?;
        for (key, staged) in &self.writes {
            let record = match staged {
                Some(value) => {
                    Record::put(key.clone(), value.clone(), self.start_ts, self.start_ts)
                }
                None => Record::delete(key.clone(), self.start_ts, self.start_ts),
            };
            self.db.wal.append(&record)?;
        }
        self.db.wal.append(&Record::txn_end(self.start_ts))?;
        self.db.wal.sync()?;

        for (key, staged) in &self.writes {
            match staged {
                Some(value) => {
                    self.db.engine.put(key, value)?;
                    self.db.bloom.write()?.add(key);
                }
                None => {
                    self.db.engine.delete(key)?;
                    self.db.bloom.write()?.remove(key);
                }
            }
        }
        self.db.engine.sync()?;

        self.db.mvcc.commit(self.start_ts)?;
        self.db.mvcc.cleanup(self.start_ts)?;

        self.committed = true;
        Ok(())
    }

    /// Discards the transaction: drops its MVCC versions and clears the
    /// write-set. Rolling back after a successful commit is an error.
    pub fn rollback(&mut self) -> Result<(), DbError> {
        if self.committed {
            return Err(DbError::AlreadyCommitted);
        }
        self.db.mvcc.abort(self.start_ts)?;
        self.writes.clear();
        Ok(())
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("start_ts", &self.start_ts)
            .field("staged_writes", &self.writes.len())
            .field("committed", &self.committed)
            .finish()
    }
}
