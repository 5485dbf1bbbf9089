//! In-memory ordered store for testing.

use crate::batch::{BatchOp, WriteBatch};
use crate::error::StorageResult;
use crate::range::KeyRange;
use crate::store::{KvPair, KvStore};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-memory ordered key-value store.
///
/// This store keeps all data in a `BTreeMap` and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral model data that doesn't need persistence
///
/// # Thread Safety
///
/// Batches are applied under a single write lock, so readers never observe
/// half of a batch.
///
/// # Example
///
/// ```rust
/// use wrangler_storage::{KvStore, MemoryStore};
///
/// let store = MemoryStore::new();
/// store.put(b"key", b"value").unwrap();
/// assert_eq!(store.get(b"key").unwrap(), Some(b"value".to_vec()));
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with pre-existing data.
    #[must_use]
    pub fn with_data(data: BTreeMap<Vec<u8>, Vec<u8>>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Returns a copy of all data in the store.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<Vec<u8>, Vec<u8>> {
        self.data.read().clone()
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Removes every key.
    pub fn clear(&self) {
        self.data.write().clear();
    }
}

/// Applies a batch to an ordered map.
pub(crate) fn apply_ops(map: &mut BTreeMap<Vec<u8>, Vec<u8>>, ops: Vec<BatchOp>) {
    for op in ops {
        match op {
            BatchOp::Put { key, value } => {
                map.insert(key, value);
            }
            BatchOp::Delete { key } => {
                map.remove(&key);
            }
        }
    }
}

/// Reads one page of `range` from an ordered map.
pub(crate) fn page_of(
    map: &BTreeMap<Vec<u8>, Vec<u8>>,
    range: &KeyRange,
    after: Option<&[u8]>,
    limit: usize,
) -> Vec<KvPair> {
    // BTreeMap::range panics on inverted bounds
    let past_end = matches!((after, range.end()), (Some(a), Some(end)) if a >= end);
    if range.is_empty() || past_end {
        return Vec::new();
    }
    map.range(range.bounds_after(after))
        .take(limit)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn write(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut data = self.data.write();
        apply_ops(&mut data, batch.into_ops());
        Ok(())
    }

    fn scan_page(
        &self,
        range: &KeyRange,
        after: Option<&[u8]>,
        limit: usize,
    ) -> StorageResult<Vec<KvPair>> {
        Ok(page_of(&self.data.read(), range, after, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get(b"missing").unwrap(), None);
    }

    #[test]
    fn memory_put_get_delete() {
        let store = MemoryStore::new();
        store.put(b"a", b"1").unwrap();
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));

        store.delete(b"a").unwrap();
        assert_eq!(store.get(b"a").unwrap(), None);

        // Deleting a missing key is fine
        store.delete(b"a").unwrap();
    }

    #[test]
    fn memory_batch_applies_in_order() {
        let store = MemoryStore::new();
        store.put(b"a", b"old").unwrap();

        let mut batch = WriteBatch::new();
        batch
            .delete(b"a".to_vec())
            .put(b"a".to_vec(), b"new".to_vec())
            .put(b"b".to_vec(), b"2".to_vec());
        store.write(batch).unwrap();

        assert_eq!(store.get(b"a").unwrap(), Some(b"new".to_vec()));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn memory_scan_page_respects_cursor_and_limit() {
        let store = MemoryStore::new();
        for k in ["a1", "a2", "a3", "b1"] {
            store.put(k.as_bytes(), b"").unwrap();
        }
        let range = KeyRange::prefix(b"a".to_vec());

        let first = store.scan_page(&range, None, 2).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[1].0, b"a2");

        let second = store.scan_page(&range, Some(b"a2"), 2).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].0, b"a3");
    }

    #[test]
    fn memory_with_data_and_clear() {
        let mut data = BTreeMap::new();
        data.insert(b"k".to_vec(), b"v".to_vec());
        let store = MemoryStore::with_data(data);
        assert_eq!(store.len(), 1);

        store.clear();
        assert!(store.snapshot().is_empty());
    }
}
