//! Key lock table.
//!
//! Saves and removes lock every index key they will read and write, so the
//! collision check and the commit of one key never interleave with another
//! writer of that key. A caller acquires all of its keys at once or waits,
//! which rules out lock-order deadlocks.

use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeSet, HashSet};

/// Table of currently locked keys.
#[derive(Debug, Default)]
pub struct KeyLocks {
    held: Mutex<HashSet<Vec<u8>>>,
    released: Condvar,
}

impl KeyLocks {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until every key is free, then locks them all.
    ///
    /// Duplicate keys are locked once.
    pub fn acquire(&self, keys: impl IntoIterator<Item = Vec<u8>>) -> KeyLockGuard<'_> {
        let keys: BTreeSet<Vec<u8>> = keys.into_iter().collect();
        let mut held = self.held.lock();
        while keys.iter().any(|k| held.contains(k)) {
            self.released.wait(&mut held);
        }
        held.extend(keys.iter().cloned());
        KeyLockGuard { locks: self, keys }
    }

    /// Returns the number of keys currently locked.
    #[must_use]
    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }
}

/// Releases its keys when dropped.
#[derive(Debug)]
pub struct KeyLockGuard<'a> {
    locks: &'a KeyLocks,
    keys: BTreeSet<Vec<u8>>,
}

impl KeyLockGuard<'_> {
    /// Returns the number of keys held by this guard.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if the guard holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Drop for KeyLockGuard<'_> {
    fn drop(&mut self) {
        if self.keys.is_empty() {
            return;
        }
        let mut held = self.locks.held.lock();
        for key in &self.keys {
            held.remove(key);
        }
        drop(held);
        self.locks.released.notify_all();
    }
}
