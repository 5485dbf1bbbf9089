//! Instrumented stores.
//!
//! [`CountingStore`] counts calls into a wrapped store, which lets tests
//! assert how many reads an operation performed. [`FaultyStore`] fails
//! writes on demand, which lets tests check that failed saves leave no
//! partial state behind.

use std::sync::atomic::{AtomicUsize, Ordering};
use wrangler_storage::{KeyRange, KvPair, KvStore, StorageError, StorageResult, WriteBatch};

/// A store wrapper that counts calls.
#[derive(Debug, Default)]
pub struct CountingStore<S> {
    inner: S,
    gets: AtomicUsize,
    writes: AtomicUsize,
    pages: AtomicUsize,
}

impl<S: KvStore> CountingStore<S> {
    /// Wraps `inner`.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            gets: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            pages: AtomicUsize::new(0),
        }
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of `get` calls so far.
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of `write` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of `scan_page` calls so far.
    pub fn pages(&self) -> usize {
        self.pages.load(Ordering::SeqCst)
    }

    /// Resets every counter to zero.
    pub fn reset(&self) {
        self.gets.store(0, Ordering::SeqCst);
        self.writes.store(0, Ordering::SeqCst);
        self.pages.store(0, Ordering::SeqCst);
    }
}

impl<S: KvStore> KvStore for CountingStore<S> {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key)
    }

    fn write(&self, batch: WriteBatch) -> StorageResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write(batch)
    }

    fn scan_page(
        &self,
        range: &KeyRange,
        after: Option<&[u8]>,
        limit: usize,
    ) -> StorageResult<Vec<KvPair>> {
        self.pages.fetch_add(1, Ordering::SeqCst);
        self.inner.scan_page(range, after, limit)
    }

    fn flush(&self) -> StorageResult<()> {
        self.inner.flush()
    }
}

/// A store wrapper whose writes can be made to fail.
///
/// Failed writes apply nothing, like a store whose log append failed.
#[derive(Debug, Default)]
pub struct FaultyStore<S> {
    inner: S,
    failures: AtomicUsize,
}

impl<S: KvStore> FaultyStore<S> {
    /// Wraps `inner` with no pending failures.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(0),
        }
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Makes the next `count` writes fail.
    pub fn fail_next_writes(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Returns how many writes are still set to fail.
    pub fn pending_failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl<S: KvStore> KvStore for FaultyStore<S> {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn write(&self, batch: WriteBatch) -> StorageResult<()> {
        if self.take_failure() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected write failure",
            )));
        }
        self.inner.write(batch)
    }

    fn scan_page(
        &self,
        range: &KeyRange,
        after: Option<&[u8]>,
        limit: usize,
    ) -> StorageResult<Vec<KvPair>> {
        self.inner.scan_page(range, after, limit)
    }

    fn flush(&self) -> StorageResult<()> {
        self.inner.flush()
    }
}
