//! Unique secondary indexes.
//!
//! An index entry maps `(attribute, token)` to the id of the record holding
//! that value. [`IndexStore`] reads entries directly and stages mutations
//! into a caller-owned [`WriteBatch`], so index maintenance always commits
//! together with the record write.
//!
//! Uniqueness is checked by the caller before staging: a [`IndexStore::lookup`]
//! that returns another id is a collision.

use crate::error::{CoreError, CoreResult};
use crate::id::ModelId;
use crate::keys::KeySpace;
use crate::value::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use wrangler_storage::{KvStore, Scan, WriteBatch};

/// One index entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Token of the indexed value.
    pub value: String,
    /// Id of the record holding the value.
    pub id: ModelId,
}

/// Index access for one model kind.
#[derive(Clone)]
pub struct IndexStore {
    keys: KeySpace,
    store: Arc<dyn KvStore>,
    page_size: usize,
}

impl IndexStore {
    /// Creates an index store over `store`.
    pub fn new(keys: KeySpace, store: Arc<dyn KvStore>, page_size: usize) -> Self {
        Self {
            keys,
            store,
            page_size,
        }
    }

    /// Returns the token of `value`, checked against the key layout.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` if the value cannot be indexed.
    pub fn token(&self, attribute: &str, value: &Value) -> CoreResult<Option<String>> {
        let token = value.index_token(attribute)?;
        if let Some(token) = &token {
            self.keys.check_token(attribute, token)?;
        }
        Ok(token)
    }

    /// Returns the key of the entry for `value`, if it has one.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` if the value cannot be indexed.
    pub fn entry_key(&self, attribute: &str, value: &Value) -> CoreResult<Option<Vec<u8>>> {
        Ok(self
            .token(attribute, value)?
            .map(|token| self.keys.index_key(attribute, &token)))
    }

    /// Returns the id holding `value`, if any.
    ///
    /// `Null` values are never indexed and always miss.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be indexed or the store fails.
    pub fn lookup(&self, attribute: &str, value: &Value) -> CoreResult<Option<ModelId>> {
        match self.token(attribute, value)? {
            Some(token) => self.lookup_token(attribute, &token),
            None => Ok(None),
        }
    }

    /// Returns the id holding `token`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the entry is not UTF-8.
    pub fn lookup_token(&self, attribute: &str, token: &str) -> CoreResult<Option<ModelId>> {
        match self.store.get(&self.keys.index_key(attribute, token))? {
            Some(bytes) => ModelId::from_bytes(&bytes)
                .map(Some)
                .ok_or_else(|| CoreError::encoding("index entry holds a non-UTF-8 id")),
            None => Ok(None),
        }
    }

    /// Fails with `IndexCollision` if `value` is held by a record other
    /// than `id`.
    ///
    /// # Errors
    ///
    /// Returns `IndexCollision`, or any error of [`IndexStore::lookup`].
    pub fn ensure_available(&self, attribute: &str, value: &Value, id: &ModelId) -> CoreResult<()> {
        match self.lookup(attribute, value)? {
            Some(existing) if existing != *id => Err(CoreError::IndexCollision {
                attribute: attribute.to_string(),
                value: value.index_token(attribute)?.unwrap_or_default(),
                existing: existing.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Stages the move of `id` from `old` to `new` under `attribute`.
    ///
    /// The old entry is deleted only if it still maps to `id`; the new entry
    /// is written whenever `new` is not `Null`. Re-staging an unchanged value
    /// rewrites the same key, so repeated saves never duplicate entries.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` if `new` cannot be indexed, or a store error.
    pub fn reconcile(
        &self,
        batch: &mut WriteBatch,
        attribute: &str,
        old: &Value,
        new: &Value,
        id: &ModelId,
    ) -> CoreResult<()> {
        let new_token = self.token(attribute, new)?;
        // An old value that could never be indexed has no entry to drop
        let old_token = self.token(attribute, old).ok().flatten();

        if let Some(old_token) = old_token {
            if new_token.as_deref() != Some(old_token.as_str())
                && self.lookup_token(attribute, &old_token)?.as_ref() == Some(id)
            {
                batch.delete(self.keys.index_key(attribute, &old_token));
            }
        }
        if let Some(new_token) = new_token {
            batch.put(self.keys.index_key(attribute, &new_token), id.as_bytes());
        }
        Ok(())
    }

    /// Stages deletes for every listed value whose entry maps to `id`.
    ///
    /// Returns the number of staged deletes.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn purge<'a>(
        &self,
        batch: &mut WriteBatch,
        attribute: &str,
        values: impl IntoIterator<Item = &'a Value>,
        id: &ModelId,
    ) -> CoreResult<usize> {
        let tokens: BTreeSet<String> = values
            .into_iter()
            .filter_map(|v| self.token(attribute, v).ok().flatten())
            .collect();

        let mut staged = 0;
        for token in tokens {
            if self.lookup_token(attribute, &token)?.as_ref() == Some(id) {
                batch.delete(self.keys.index_key(attribute, &token));
                staged += 1;
            }
        }
        Ok(staged)
    }

    /// Scans every entry of `attribute` in token order.
    pub fn scan_ids(&self, attribute: &str) -> IndexScan {
        IndexScan::new(
            self.keys.clone(),
            attribute,
            Scan::new(
                Arc::clone(&self.store),
                self.keys.index_range(attribute),
                self.page_size,
            ),
        )
    }

    /// Scans entries of `attribute` whose token lies in `[lower, upper]`.
    ///
    /// Bounds compare as token text, so numbers order as strings.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` if a bound cannot be indexed.
    pub fn scan_range(
        &self,
        attribute: &str,
        lower: Option<&Value>,
        upper: Option<&Value>,
    ) -> CoreResult<IndexScan> {
        let lower = match lower {
            Some(v) => self.token(attribute, v)?,
            None => None,
        };
        let upper = match upper {
            Some(v) => self.token(attribute, v)?,
            None => None,
        };
        let range = self
            .keys
            .index_bounds(attribute, lower.as_deref(), upper.as_deref());
        Ok(IndexScan::new(
            self.keys.clone(),
            attribute,
            Scan::new(Arc::clone(&self.store), range, self.page_size),
        ))
    }
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore")
            .field("kind", &self.keys.kind())
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

/// Lazy, restartable scan over the entries of one attribute.
#[derive(Debug)]
pub struct IndexScan {
    keys: KeySpace,
    attribute: String,
    scan: Scan,
}

impl IndexScan {
    fn new(keys: KeySpace, attribute: &str, scan: Scan) -> Self {
        Self {
            keys,
            attribute: attribute.to_string(),
            scan,
        }
    }

    /// Rewinds to the first entry.
    pub fn restart(&mut self) {
        self.scan.restart();
    }

    /// Returns how many pages have been read from the store.
    #[must_use]
    pub fn pages_fetched(&self) -> usize {
        self.scan.pages_fetched()
    }
}

impl Iterator for IndexScan {
    type Item = CoreResult<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, value) = match self.scan.next()? {
            Ok(pair) => pair,
            Err(e) => return Some(Err(e.into())),
        };
        let entry = self
            .keys
            .token_from_index_key(&self.attribute, &key)
            .zip(ModelId::from_bytes(&value))
            .map(|(value, id)| IndexEntry { value, id })
            .ok_or_else(|| CoreError::encoding("malformed index entry"));
        Some(entry)
    }
}
