use std::collections::BTreeMap;

/// Locator points at one record inside a segment file.
/// `size` is the full encoded length, header included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub file_id: i64,
    pub offset: u64,
    pub size: u64,
    pub timestamp: i64,
}

/// In-memory index from key bytes to the newest on-disk record location.
///
/// Backed by an ordered map so iteration yields keys in byte order; callers
/// outside the engine must not rely on that ordering.
#[derive(Debug, Default)]
pub struct KeyDir {
    map: BTreeMap<Vec<u8>, Locator>,
}

impl KeyDir {
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    /// Insert or overwrite the locator for a key.
    pub fn add(&mut self, key: Vec<u8>, locator: Locator) {
        self.map.insert(key, locator);
    }

    /// Look up the locator for a key.
    pub fn find(&self, key: &[u8]) -> Option<&Locator> {
        self.map.get(key)
    }

    /// Remove a key; returns whether it was present.
    pub fn del(&mut self, key: &[u8]) -> bool {
        self.map.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Ordered iterator over `(key, locator)` entries.
    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &Locator)> {
        self.map.iter()
    }

    /// Snapshot of all keys, in byte order.
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.map.keys().cloned().collect()
    }
}
