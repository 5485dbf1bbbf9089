//! Pending attribute mutations of a model instance.
//!
//! A [`ChangeLog`] holds at most one [`ChangeRecord`] per attribute. Writing
//! the same attribute again coalesces into the existing record: the first
//! `old_value` is kept and `new_value` is overridden, so the record always
//! spans from the last persisted value to the latest one.

use crate::error::{CoreError, CoreResult};
use crate::value::{Props, Value};

/// One pending mutation of one attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    /// Attribute name.
    pub key: String,
    /// Value before the first pending write.
    pub old_value: Value,
    /// Latest written value.
    pub new_value: Value,
    /// Whether the attribute is indexed.
    pub indexed: bool,
}

impl ChangeRecord {
    /// Creates a change record.
    pub fn new(key: impl Into<String>, old_value: Value, new_value: Value, indexed: bool) -> Self {
        Self {
            key: key.into(),
            old_value,
            new_value,
            indexed,
        }
    }

    /// Returns true if the record ends where it started.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.old_value == self.new_value
    }
}

/// Result of [`ChangeLog::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The log was appended to or an entry was updated.
    Changed,
    /// The key already held this `new_value`; nothing happened.
    Unchanged,
}

/// Ordered log of pending mutations, unique per key.
///
/// Order is that of the most recent append or update, which makes
/// [`ChangeLog::pop`] return the most recently touched attribute.
#[derive(Debug, Clone, Default)]
pub struct ChangeLog {
    records: Vec<ChangeRecord>,
}

impl ChangeLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a mutation.
    ///
    /// An existing entry for the key is replaced in place: it keeps its
    /// position and its `old_value`, and takes the new `new_value`.
    pub fn push(&mut self, record: ChangeRecord) -> PushOutcome {
        match self.records.iter_mut().find(|r| r.key == record.key) {
            Some(existing) if existing.new_value == record.new_value => PushOutcome::Unchanged,
            Some(existing) => {
                existing.new_value = record.new_value;
                existing.indexed = record.indexed;
                PushOutcome::Changed
            }
            None => {
                self.records.push(record);
                PushOutcome::Changed
            }
        }
    }

    /// Removes and returns the last record of the log.
    ///
    /// # Errors
    ///
    /// Returns `EmptyLog` if there is nothing to pop.
    pub fn pop(&mut self) -> CoreResult<ChangeRecord> {
        self.records.pop().ok_or(CoreError::EmptyLog)
    }

    /// Returns the number of pending records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates over pending records in log order.
    pub fn iter(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.records.iter()
    }

    /// Returns the pending record for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ChangeRecord> {
        self.records.iter().find(|r| r.key == key)
    }

    /// Returns a copy of all pending records.
    #[must_use]
    pub fn records(&self) -> Vec<ChangeRecord> {
        self.records.clone()
    }

    /// Drops every pending record without persisting it.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Reconciles the log with a completed save.
    ///
    /// `saved` holds the values written. Records whose `new_value` was
    /// written are dropped. Records written again while the save ran are
    /// kept, with `old_value` moved to the persisted value.
    pub fn settle(&mut self, saved: &Props) {
        self.records.retain_mut(|record| match saved.get(&record.key) {
            Some(persisted) if *persisted == record.new_value => false,
            Some(persisted) => {
                record.old_value = persisted.clone();
                true
            }
            None => true,
        });
    }
}

impl<'a> IntoIterator for &'a ChangeLog {
    type Item = &'a ChangeRecord;
    type IntoIter = std::slice::Iter<'a, ChangeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
