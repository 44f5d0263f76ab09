/// Multi-version concurrency control.
///
/// Every key maps to an append-ordered chain of versions behind its own
/// reader/writer lock; the chains live in a sharded concurrent map, so
/// transactions touching different keys never contend. Writers append
/// uncommitted versions; commit flips them visible per key; readers scan
/// newest-to-oldest for the first committed version at or before their
/// snapshot.
use dashmap::DashMap;
use std::sync::RwLock;

use crate::DbError;

/// What a version holds: a value, or an in-transaction delete.
///
/// Modeling the tombstone explicitly lets `read` distinguish "deleted as of
/// this snapshot" from "no version at or before this snapshot" — the two
/// send a reader down different paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stored {
    Value(Vec<u8>),
    Tombstone,
}

#[derive(Debug)]
struct Version {
    stored: Stored,
    /// The owning transaction's start timestamp.
    ts: i64,
    committed: bool,
}

/// The version table. Cheap to share by reference; all methods take `&self`.
#[derive(Debug, Default)]
pub struct MvccTable {
    versions: DashMap<Vec<u8>, RwLock<Vec<Version>>>,
}

impl MvccTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the newest committed version with `ts <= snapshot_ts`, or
    /// `None` when no such version exists.
    pub fn read(&self, key: &[u8], snapshot_ts: i64) -> Result<Option<Stored>, DbError> {
        let Some(chain) = self.versions.get(key) else {
            return Ok(None);
        };
        let versions = chain.read()?;
        Ok(versions
            .iter()
            .rev()
            .find(|v| v.committed && v.ts <= snapshot_ts)
            .map(|v| v.stored.clone()))
    }

    /// Appends an uncommitted version for `txn_id`.
    pub fn write(&self, key: &[u8], stored: Stored, txn_id: i64) -> Result<(), DbError> {
        let chain = self.versions.entry(key.to_vec()).or_default();
        chain.write()?.push(Version {
            stored,
            ts: txn_id,
            committed: false,
        });
        Ok(())
    }

    /// Makes every version written by `txn_id` visible. The flip happens
    /// under each key's write lock, so per key a reader sees either the old
    /// or the new state, never a torn one.
    pub fn commit(&self, txn_id: i64) -> Result<(), DbError> {
        for entry in self.versions.iter() {
            let mut versions = entry.value().write()?;
            for version in versions.iter_mut() {
                if version.ts == txn_id {
                    version.committed = true;
                }
            }
        }
        Ok(())
    }

    /// Drops every version written by `txn_id`.
    pub fn abort(&self, txn_id: i64) -> Result<(), DbError> {
        self.prune(|version| version.ts != txn_id)
    }

    /// Drops uncommitted versions strictly older than `horizon_ts` —
    /// leftovers of transactions that can no longer commit them.
    pub fn cleanup(&self, horizon_ts: i64) -> Result<(), DbError> {
        self.prune(|version| version.committed || version.ts >= horizon_ts)
    }

    /// Number of versions currently held for a key (any commit state).
    pub fn version_count(&self, key: &[u8]) -> Result<usize, DbError> {
        match self.versions.get(key) {
            Some(chain) => Ok(chain.read()?.len()),
            None => Ok(0),
        }
    }

    /// Retains only versions matching `keep`, then drops chains that became
    /// empty. Removal re-checks emptiness under the map's own lock, since a
    /// concurrent writer may have appended in between.
    fn prune<F: Fn(&Version) -> bool>(&self, keep: F) -> Result<(), DbError> {
        let mut emptied = Vec::new();
        for entry in self.versions.iter() {
            let mut versions = entry.value().write()?;
            versions.retain(&keep);
            if versions.is_empty() {
                emptied.push(entry.key().clone());
            }
        }
        for key in emptied {
            self.versions.remove_if(&key, |_, chain| {
                chain.read().map(|versions| versions.is_empty()).unwrap_or(false)
            });
        }
        Ok(())
    }
}
