//! Store fixtures.
//!
//! Provides convenience functions for setting up stores in tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use wrangler_storage::{FileStore, KvStore, MemoryStore, WriteBatch};

/// A file store in a temporary directory that is deleted on drop.
pub struct TestStore {
    /// The store.
    pub store: Arc<FileStore>,
    /// The temporary directory (kept alive to prevent cleanup).
    dir: TempDir,
}

impl TestStore {
    /// Creates a file store in a new temporary directory.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::open(dir.path()).expect("Failed to open file store");
        Self {
            store: Arc::new(store),
            dir,
        }
    }

    /// Returns the store directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Closes the store and opens it again from disk.
    ///
    /// Panics if another handle on the store is still alive.
    pub fn reopen(self) -> Self {
        let Self { store, dir } = self;
        drop(Arc::try_unwrap(store).expect("store still shared"));
        let store = FileStore::open(dir.path()).expect("Failed to reopen file store");
        Self {
            store: Arc::new(store),
            dir,
        }
    }

    /// Hands the directory over to the caller, keeping it on disk.
    pub fn into_dir(self) -> (PathBuf, TempDir) {
        drop(self.store);
        (self.dir.path().to_path_buf(), self.dir)
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestStore {
    type Target = FileStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a fresh in-memory store.
pub fn with_memory_store<F, R>(f: F) -> R
where
    F: FnOnce(Arc<dyn KvStore>) -> R,
{
    f(Arc::new(MemoryStore::new()))
}

/// Runs a test with a fresh file store in a temporary directory.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(Arc<dyn KvStore>, &Path) -> R,
{
    let test_store = TestStore::new();
    let store: Arc<dyn KvStore> = test_store.store.clone();
    f(store, test_store.path())
}

/// Creates a memory store holding `count` keys `key00000`, `key00001`, ...
pub fn populated_store(count: usize) -> MemoryStore {
    let store = MemoryStore::new();
    let mut batch = WriteBatch::new();
    for i in 0..count {
        batch.put(format!("key{i:05}").into_bytes(), i.to_le_bytes().to_vec());
    }
    store.write(batch).expect("Failed to populate store");
    store
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_reopens_with_data() {
        let test_store = TestStore::new();
        test_store.put(b"k", b"v").unwrap();

        let test_store = test_store.reopen();
        assert_eq!(test_store.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn file_fixture_runs_closure() {
        let found = with_file_store(|store, path| {
            store.put(b"k", b"v").unwrap();
            assert!(path.exists());
            store.get(b"k").unwrap()
        });
        assert_eq!(found, Some(b"v".to_vec()));
    }

    #[test]
    fn populated_store_has_keys() {
        let store = populated_store(10);
        assert_eq!(store.len(), 10);
        assert!(store.get(b"key00009").unwrap().is_some());
    }
}
