//! # DB — the transactional CinderKV facade
//!
//! Wires the four subsystems into one handle:
//!
//! ```text
//!            ┌───────────────────────────────┐
//!  put/del → │ Transaction                   │
//!            │   stage → WAL → fsync ──────────── durability boundary
//!            │        → engine + filter      │
//!            │        → MVCC visibility flip │
//!            │                               │
//!  get ────→ │ filter (fast negative)        │
//!            │   → MVCC snapshot             │
//!            │   → engine (durable value)    │
//!            └───────────────────────────────┘
//! ```
//!
//! `put` and `delete` on the facade are sugar over a single-statement
//! transaction — they never bypass the WAL, so recovery's assumptions hold
//! for every write path.
//!
//! ## Recovery
//!
//! Opening replays the WAL: every logically committed record (see the `wal`
//! crate's framing contract) is applied to the engine and the membership
//! filter, the engine is synced, and only then is the WAL truncated. If the
//! process dies mid-recovery the WAL is still intact and replay resumes on
//! the next open.

mod mvcc;
mod txn;

pub use mvcc::{MvccTable, Stored};
pub use txn::Transaction;

use bloom::CountingBloomFilter;
use engine::{Engine, EngineError, Options as EngineOptions};
use segment::Op;
use std::path::Path;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use wal::{Wal, WalError};

/// Facade configuration. The bloom parameters size the membership filter;
/// `merge_on_close` compacts the data directory during a clean shutdown.
#[derive(Debug, Clone)]
pub struct DbOptions {
    pub bloom_n: usize,
    pub bloom_fp: f64,
    pub merge_on_close: bool,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            bloom_n: 100_000,
            bloom_fp: 0.01,
            merge_on_close: false,
        }
    }
}

/// Errors surfaced by the facade and transactions.
#[derive(Debug, Error)]
pub enum DbError {
    /// The key has no live value at the requested snapshot.
    #[error("key not found")]
    KeyNotFound,

    /// `commit` or `rollback` was called on an already-committed
    /// transaction.
    #[error("transaction already committed")]
    AlreadyCommitted,

    /// Propagated engine failure.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Propagated WAL failure.
    #[error(transparent)]
    Wal(#[from] WalError),

    /// A lock was poisoned by a thread that panicked while holding it.
    #[error("lock poisoned")]
    LockPoisoned,
}

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        DbError::LockPoisoned
    }
}

/// A CinderKV database: engine + WAL + MVCC + membership filter.
///
/// All methods take `&self`; internal locking makes the handle shareable
/// across threads by reference.
pub struct Db {
    pub(crate) engine: Engine,
    pub(crate) bloom: RwLock<CountingBloomFilter>,
    pub(crate) wal: Wal,
    pub(crate) mvcc: MvccTable,
    options: DbOptions,
}

impl Db {
    /// Opens the database over `dir`: opens the engine, sizes the filter,
    /// opens the WAL at `<dir>/wal/wal.log`, seeds the filter from the
    /// engine's live keys, and runs recovery.
    pub fn open<P: AsRef<Path>>(
        dir: P,
        engine_options: EngineOptions,
        options: DbOptions,
    ) -> Result<Db, DbError> {
        let dir = dir.as_ref();
        let engine = Engine::open(dir, engine_options)?;
        let filter = CountingBloomFilter::new(options.bloom_n, options.bloom_fp);
        let wal = Wal::open(&dir.join("wal"))?;

        let db = Db {
            engine,
            bloom: RwLock::new(filter),
            wal,
            mvcc: MvccTable::new(),
            options,
        };

        {
            let mut filter = db.bloom.write()?;
            for key in db.engine.list_keys()? {
                filter.add(&key);
            }
        }

        db.recover()?;
        Ok(db)
    }

    /// Replays logically committed WAL records into the engine and filter,
    /// then truncates the WAL. Clearing strictly last means a crash here
    /// leaves the log intact for the next attempt.
    fn recover(&self) -> Result<(), DbError> {
        let records = self.wal.read_all()?;
        if !records.is_empty() {
            for record in &records {
                match &record.op {
                    Op::Put { key, value } => {
                        self.engine.put(key, value)?;
                        self.bloom.write()?.add(key);
                    }
                    Op::Delete { key } => {
                        self.engine.delete(key)?;
                        self.bloom.write()?.remove(key);
                    }
                    Op::TxnBegin | Op::TxnEnd => {}
                }
            }
            self.engine.sync()?;
        }
        self.wal.clear()?;
        Ok(())
    }

    /// Looks up a key at the current wall clock.
    ///
    /// The filter answers first: a negative is definitive and skips both
    /// the MVCC table and the disk. A committed MVCC value wins next; a
    /// tombstone or no visible version falls through to the engine, which
    /// holds the durable answer.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>, DbError> {
        if !self.bloom.read()?.contains(key) {
            return Err(DbError::KeyNotFound);
        }

        match self.mvcc.read(key, wall_clock_nanos())? {
            Some(Stored::Value(value)) => Ok(value),
            _ => self.engine_get(key),
        }
    }

    /// Writes a key as a single-statement auto-committed transaction.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), DbError> {
        let mut txn = self.begin();
        txn.put(key, value)?;
        txn.commit()
    }

    /// Deletes a key as a single-statement auto-committed transaction.
    pub fn delete(&self, key: &[u8]) -> Result<(), DbError> {
        let mut txn = self.begin();
        txn.delete(key)?;
        txn.commit()
    }

    /// Starts a transaction whose snapshot is the current wall clock.
    pub fn begin(&self) -> Transaction<'_> {
        Transaction::new(self, wall_clock_nanos())
    }

    /// Snapshot of the engine's live keys. No ordering is promised.
    pub fn keys(&self) -> Result<Vec<Vec<u8>>, DbError> {
        Ok(self.engine.list_keys()?)
    }

    /// Compacts the data directory down to a single segment.
    pub fn merge(&self) -> Result<(), DbError> {
        self.engine.merge()?;
        Ok(())
    }

    /// Closes the database: optionally merges, syncs the engine, truncates
    /// the WAL (everything in it is already applied and durable), and
    /// releases both the WAL and the engine.
    pub fn close(self) -> Result<(), DbError> {
        if self.options.merge_on_close {
            self.engine.merge()?;
        }
        self.engine.sync()?;
        self.wal.clear()?;
        self.wal.close()?;
        self.engine.close()?;
        Ok(())
    }

    /// Engine lookup with the engine's miss folded into the facade's.
    pub(crate) fn engine_get(&self, key: &[u8]) -> Result<Vec<u8>, DbError> {
        match self.engine.get(key) {
            Err(EngineError::KeyNotFound) => Err(DbError::KeyNotFound),
            other => other.map_err(DbError::from),
        }
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Db");
        s.field("engine", &self.engine);
        match self.bloom.read() {
            Ok(filter) => {
                s.field("bloom", &*filter);
            }
            Err(_) => {
                s.field("bloom", &"<lock poisoned>");
            }
        }
        s.field("merge_on_close", &self.options.merge_on_close);
        s.finish()
    }
}

/// Wall-clock nanoseconds since the unix epoch; transaction snapshot
/// timestamps and txn ids both come from here.
pub(crate) fn wall_clock_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests;
