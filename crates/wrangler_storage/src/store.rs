//! Ordered key-value store trait definition.

use crate::batch::WriteBatch;
use crate::error::StorageResult;
use crate::range::KeyRange;

/// A key-value pair returned by scans.
pub type KvPair = (Vec<u8>, Vec<u8>);

/// An ordered, durable key-value store.
///
/// Stores are **opaque byte maps**. They know nothing about models, records
/// or indexes; Wrangler owns all key layout and value interpretation.
///
/// # Invariants
///
/// - Keys are ordered bytewise
/// - `write` applies every operation of a batch or none of them
/// - Once `write` returns `Ok`, the batch is durable for the store's
///   durability level
/// - `scan_page` returns keys in ascending order
/// - Stores must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::MemoryStore`] - For testing and ephemeral data
/// - [`super::FileStore`] - For persistent data
pub trait KvStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Applies a batch atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch cannot be made durable. In that case
    /// none of its operations are visible.
    fn write(&self, batch: WriteBatch) -> StorageResult<()>;

    /// Returns up to `limit` pairs of `range`, in key order, strictly after
    /// `after` when given.
    ///
    /// This is the paging primitive behind [`crate::Scan`].
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn scan_page(
        &self,
        range: &KeyRange,
        after: Option<&[u8]>,
        limit: usize,
    ) -> StorageResult<Vec<KvPair>>;

    /// Writes a single key.
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be made durable.
    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write(batch)
    }

    /// Deletes a single key.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete cannot be made durable.
    fn delete(&self, key: &[u8]) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write(batch)
    }

    /// Flushes buffered state to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&self) -> StorageResult<()> {
        Ok(())
    }
}
