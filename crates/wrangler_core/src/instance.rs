//! Live model instances.
//!
//! A [`ModelInstance`] is the mutable, in-memory form of one record. Writes
//! go through [`ModelInstance::set`], which validates the attribute against
//! the schema and appends to the instance's [`ChangeLog`]. Nothing reaches
//! the store until [`ModelInstance::save`].
//!
//! # Save protocol
//!
//! 1. Snapshot the attributes and the change log
//! 2. Reject `Null` required attributes
//! 3. Lock every index key the save will read or write
//! 4. Check all changed indexed values for collisions, staging nothing
//! 5. Stage index reconciliation and the record put in one batch
//! 6. Commit, then settle the change log
//!
//! A failure at any step leaves the change log untouched, so the save can
//! simply be retried.

use crate::change_log::{ChangeLog, ChangeRecord, PushOutcome};
use crate::error::{CoreError, CoreResult};
use crate::events::{EventBus, ModelEvent};
use crate::id::ModelId;
use crate::model::ModelKind;
use crate::record::Record;
use crate::schema::{is_private, is_reserved, Attribute, Schema};
use crate::value::{Props, Value};
use parking_lot::Mutex;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use wrangler_storage::WriteBatch;

/// Lifecycle of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Created and never saved.
    New,
    /// Has changes not yet saved.
    Dirty,
    /// Matches the stored record.
    Saved,
    /// Removed from the store. Terminal.
    Removed,
}

#[derive(Debug)]
struct State {
    attributes: Props,
    private: Props,
    changes: ChangeLog,
    lifecycle: InstanceState,
    /// Whether a record has ever been written or read for this instance.
    stored: bool,
}

/// Result of re-reading a cached instance from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefreshOutcome {
    /// The stored record was applied.
    Applied,
    /// The instance has pending changes or is not saved.
    Skipped,
    /// The record no longer exists.
    Gone,
}

/// A live instance of a model kind.
///
/// Instances are shared as `Arc<ModelInstance>` and are safe to use from
/// several threads. Two saves of the same instance never interleave.
pub struct ModelInstance {
    id: ModelId,
    kind: Arc<ModelKind>,
    state: Mutex<State>,
    save_guard: Mutex<()>,
    events: EventBus,
}

impl ModelInstance {
    /// Builds a new instance from caller props.
    pub(crate) fn create(kind: Arc<ModelKind>, props: &Props) -> CoreResult<Arc<Self>> {
        let mut private = Props::new();
        for (key, value) in props {
            if is_reserved(key) {
                return Err(CoreError::ReservedKeyConflict { name: key.clone() });
            }
            if is_private(key) {
                private.insert(key.clone(), value.clone());
            } else if !kind.schema.contains(key) {
                return Err(CoreError::unknown_attribute(key.as_str()));
            }
        }

        let id = kind.keys.mint_id();
        let mut attributes = Props::new();
        let mut changes = ChangeLog::new();
        let mut added = Vec::new();
        for attr in kind.schema.iter() {
            let value = match props.get(attr.name()) {
                Some(v) if !v.is_null() => v.clone(),
                _ => attr.default_value().clone(),
            };
            changes.push(ChangeRecord::new(
                attr.name(),
                Value::Null,
                value.clone(),
                attr.is_indexed(),
            ));
            if !attr.is_silent() {
                added.push(ModelEvent::Added {
                    id: id.clone(),
                    key: attr.name().to_string(),
                    value: value.clone(),
                });
            }
            attributes.insert(attr.name().to_string(), value);
        }

        let instance = Arc::new(Self::with_state(
            id,
            kind,
            State {
                attributes,
                private,
                changes,
                lifecycle: InstanceState::New,
                stored: false,
            },
        ));
        for event in &added {
            instance.publish(event);
        }
        Ok(instance)
    }

    /// Rebuilds an instance from its stored record.
    pub(crate) fn from_record(kind: Arc<ModelKind>, record: Record) -> Arc<Self> {
        let attributes = attributes_from(&kind.schema, record.attributes);
        Arc::new(Self::with_state(
            record.id,
            kind,
            State {
                attributes,
                private: Props::new(),
                changes: ChangeLog::new(),
                lifecycle: InstanceState::Saved,
                stored: true,
            },
        ))
    }

    fn with_state(id: ModelId, kind: Arc<ModelKind>, state: State) -> Self {
        Self {
            id,
            kind,
            state: Mutex::new(state),
            save_guard: Mutex::new(()),
            events: EventBus::new(),
        }
    }

    /// Returns the instance id.
    #[must_use]
    pub fn id(&self) -> &ModelId {
        &self.id
    }

    /// Returns the name of the instance's model kind.
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.kind.name
    }

    /// Returns the schema of the instance's model kind.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.kind.schema
    }

    pub(crate) fn kind(&self) -> &Arc<ModelKind> {
        &self.kind
    }

    /// Returns the current value of an attribute.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.lock().attributes.get(key).cloned()
    }

    /// Returns a copy of every attribute, silent ones included.
    #[must_use]
    pub fn attributes(&self) -> Props {
        self.state.lock().attributes.clone()
    }

    /// Returns a private (`_`-prefixed) property.
    #[must_use]
    pub fn private(&self, key: &str) -> Option<Value> {
        self.state.lock().private.get(key).cloned()
    }

    /// Sets a private property. Private properties are never persisted.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` if `key` does not start with `_`.
    pub fn set_private(&self, key: &str, value: impl Into<Value>) -> CoreResult<()> {
        if !is_private(key) {
            return Err(CoreError::invalid_name(key, "private keys start with '_'"));
        }
        self.state.lock().private.insert(key.to_string(), value.into());
        Ok(())
    }

    /// Writes an attribute.
    ///
    /// Returns `Unchanged` if the attribute already holds `value`. Unless
    /// the attribute is silent, a change publishes a `Change` event.
    ///
    /// # Errors
    ///
    /// Returns `InstanceRemoved` after removal and `UnknownAttribute` for
    /// undeclared keys.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> CoreResult<PushOutcome> {
        let value = value.into();
        let attr = self.attribute(key)?;

        let outcome = {
            let mut state = self.state.lock();
            if state.lifecycle == InstanceState::Removed {
                return Err(self.removed());
            }
            let current = state.attributes.get(key).cloned().unwrap_or_default();
            if state.changes.get(key).is_none() && current == value {
                return Ok(PushOutcome::Unchanged);
            }
            let outcome = state.changes.push(ChangeRecord::new(
                key,
                current,
                value.clone(),
                attr.is_indexed(),
            ));
            if outcome == PushOutcome::Changed {
                state.attributes.insert(key.to_string(), value.clone());
                state.lifecycle = InstanceState::Dirty;
            }
            outcome
        };

        if outcome == PushOutcome::Changed && !attr.is_silent() {
            self.publish(&ModelEvent::Change {
                id: self.id.clone(),
                key: key.to_string(),
                value,
            });
        }
        Ok(outcome)
    }

    /// Returns the pending change records in log order.
    #[must_use]
    pub fn changes(&self) -> Vec<ChangeRecord> {
        self.state.lock().changes.records()
    }

    /// Returns the number of pending change records.
    #[must_use]
    pub fn pending_changes(&self) -> usize {
        self.state.lock().changes.len()
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> InstanceState {
        self.state.lock().lifecycle
    }

    /// Returns true if there are unsaved changes.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.state.lock().changes.is_empty()
    }

    /// Subscribes to every event of this instance.
    pub fn subscribe(&self) -> Receiver<ModelEvent> {
        self.events.subscribe()
    }

    /// Subscribes to events about one attribute.
    pub fn subscribe_attribute(&self, key: &str) -> Receiver<ModelEvent> {
        self.events.subscribe_attribute(key)
    }

    /// Persists the instance and its index entries in one atomic batch.
    ///
    /// Returns the record that was written.
    ///
    /// # Errors
    ///
    /// - `InstanceRemoved` after removal
    /// - `MissingRequired` if a required attribute is `Null`
    /// - `InvalidValue` if a changed indexed value cannot be indexed
    /// - `IndexCollision` if a changed indexed value belongs to another record
    /// - store errors, unchanged
    ///
    /// On error nothing is written and the change log is kept.
    pub fn save(&self) -> CoreResult<Record> {
        self.kind.ensure_open()?;
        let _guard = self.save_guard.lock();

        let (attributes, changes, stored) = {
            let state = self.state.lock();
            if state.lifecycle == InstanceState::Removed {
                return Err(self.removed());
            }
            (state.attributes.clone(), state.changes.records(), state.stored)
        };

        let schema = &self.kind.schema;
        for attr in schema.iter().filter(|a| a.is_required()) {
            if attributes.get(attr.name()).map_or(true, Value::is_null) {
                return Err(CoreError::MissingRequired {
                    name: attr.name().to_string(),
                });
            }
        }

        let indexed: Vec<&ChangeRecord> = changes
            .iter()
            .filter(|c| c.indexed && schema.get(&c.key).is_some_and(Attribute::is_persisted))
            .collect();
        let index = &self.kind.index;

        // Another handle on the same id may have moved the stored values
        let persisted = if stored && !indexed.is_empty() {
            self.kind.read_record(&self.id)?
        } else {
            None
        };
        let stored_value = |key: &str| persisted.as_ref().and_then(|r| r.get(key));

        let mut lock_keys = Vec::new();
        for change in &indexed {
            if let Some(key) = index.entry_key(&change.key, &change.new_value)? {
                lock_keys.push(key);
            }
            let olds = std::iter::once(&change.old_value).chain(stored_value(&change.key));
            for old in olds {
                if let Ok(Some(key)) = index.entry_key(&change.key, old) {
                    lock_keys.push(key);
                }
            }
        }
        let _locks = self.kind.locks.acquire(lock_keys);

        for change in &indexed {
            index.ensure_available(&change.key, &change.new_value, &self.id)?;
        }

        let mut batch = WriteBatch::new();
        for change in &indexed {
            if let Some(stale) = stored_value(&change.key) {
                if *stale != change.old_value && *stale != change.new_value {
                    index.purge(&mut batch, &change.key, [stale], &self.id)?;
                }
            }
            index.reconcile(
                &mut batch,
                &change.key,
                &change.old_value,
                &change.new_value,
                &self.id,
            )?;
        }
        let record = Record::new(self.id.clone(), persisted_attributes(schema, &attributes));
        batch.put(self.kind.keys.record_key(&self.id), record.encode()?);
        let ops = batch.len();
        self.kind.store.write(batch)?;

        {
            let mut state = self.state.lock();
            state.changes.settle(&attributes);
            state.stored = true;
            state.lifecycle = if state.changes.is_empty() {
                InstanceState::Saved
            } else {
                InstanceState::Dirty
            };
        }

        tracing::debug!(
            model = %self.kind.name,
            id = %self.id,
            indexed = indexed.len(),
            ops,
            "saved instance"
        );
        self.publish(&ModelEvent::Saved {
            id: self.id.clone(),
        });
        Ok(record)
    }

    /// Deletes the record and every index entry that references it.
    ///
    /// # Errors
    ///
    /// Returns `InstanceRemoved` if already removed, or a store error. On
    /// error nothing is deleted.
    pub fn remove(&self) -> CoreResult<()> {
        self.kind.ensure_open()?;
        let _guard = self.save_guard.lock();

        let current = {
            let state = self.state.lock();
            if state.lifecycle == InstanceState::Removed {
                return Err(self.removed());
            }
            state.attributes.clone()
        };
        let persisted = self.kind.read_record(&self.id)?;

        let index = &self.kind.index;
        let indexed: Vec<(&str, Vec<&Value>)> = self
            .kind
            .schema
            .indexed()
            .filter(|a| a.is_persisted())
            .map(|a| {
                let values = current
                    .get(a.name())
                    .into_iter()
                    .chain(persisted.as_ref().and_then(|r| r.get(a.name())))
                    .collect();
                (a.name(), values)
            })
            .collect();

        let mut lock_keys = Vec::new();
        for (name, values) in &indexed {
            for value in values {
                if let Ok(Some(key)) = index.entry_key(name, value) {
                    lock_keys.push(key);
                }
            }
        }
        let _locks = self.kind.locks.acquire(lock_keys);

        let mut batch = WriteBatch::new();
        let mut purged = 0;
        for (name, values) in &indexed {
            purged += index.purge(&mut batch, name, values.iter().copied(), &self.id)?;
        }
        batch.delete(self.kind.keys.record_key(&self.id));
        self.kind.store.write(batch)?;

        {
            let mut state = self.state.lock();
            state.lifecycle = InstanceState::Removed;
            state.changes.clear();
        }

        tracing::debug!(model = %self.kind.name, id = %self.id, purged, "removed instance");
        self.publish(&ModelEvent::Removed {
            id: self.id.clone(),
        });
        Ok(())
    }

    /// Undoes every pending change, most recent first.
    ///
    /// Returns the number of reverted records.
    ///
    /// # Errors
    ///
    /// Returns `InstanceRemoved` after removal.
    pub fn revert(&self) -> CoreResult<usize> {
        let reverted = {
            let mut state = self.state.lock();
            if state.lifecycle == InstanceState::Removed {
                return Err(self.removed());
            }
            let mut reverted = Vec::new();
            while let Ok(record) = state.changes.pop() {
                state
                    .attributes
                    .insert(record.key.clone(), record.old_value.clone());
                reverted.push(record);
            }
            if state.stored {
                state.lifecycle = InstanceState::Saved;
            }
            reverted
        };

        for record in &reverted {
            let silent = self.kind.schema.get(&record.key).map_or(true, Attribute::is_silent);
            if !silent {
                self.publish(&ModelEvent::Change {
                    id: self.id.clone(),
                    key: record.key.clone(),
                    value: record.old_value.clone(),
                });
            }
        }
        Ok(reverted.len())
    }

    /// Returns the record a save would write now.
    #[must_use]
    pub fn to_record(&self) -> Record {
        Record::new(self.id.clone(), self.serialize())
    }

    /// Returns the persisted attributes. Private and silent values are
    /// stripped.
    #[must_use]
    pub fn serialize(&self) -> Props {
        persisted_attributes(&self.kind.schema, &self.state.lock().attributes)
    }

    /// Re-reads the stored record and applies it to a clean, saved
    /// instance.
    ///
    /// Holds the save guard across the read and the apply, so a save of
    /// this instance can never land in between.
    pub(crate) fn refresh(&self) -> CoreResult<RefreshOutcome> {
        let _guard = self.save_guard.lock();
        if !self.is_clean_saved() {
            return Ok(RefreshOutcome::Skipped);
        }
        match self.kind.read_record(&self.id)? {
            Some(record) if self.apply_refresh(record.clone()) => Ok(RefreshOutcome::Applied),
            Some(_) => Ok(RefreshOutcome::Skipped),
            None if self.is_clean_saved() => Ok(RefreshOutcome::Gone),
            None => Ok(RefreshOutcome::Skipped),
        }
    }

    fn is_clean_saved(&self) -> bool {
        let state = self.state.lock();
        state.lifecycle == InstanceState::Saved && state.changes.is_empty()
    }

    /// Replaces attributes with a freshly read record.
    ///
    /// Applies only to a clean, saved instance. Returns whether it applied.
    fn apply_refresh(&self, record: Record) -> bool {
        let events: Vec<ModelEvent> = {
            let mut state = self.state.lock();
            if state.lifecycle != InstanceState::Saved || !state.changes.is_empty() {
                return false;
            }
            let fresh = attributes_from(&self.kind.schema, record.attributes);
            let events = fresh
                .iter()
                .filter(|(key, value)| state.attributes.get(*key) != Some(*value))
                .filter(|(key, _)| self.kind.schema.get(key).is_some_and(|a| !a.is_silent()))
                .map(|(key, value)| ModelEvent::Change {
                    id: self.id.clone(),
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect();
            let silent: Vec<(String, Value)> = state
                .attributes
                .iter()
                .filter(|(key, _)| self.kind.schema.get(key).is_some_and(Attribute::is_silent))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            state.attributes = fresh;
            // Silent values live only in memory
            state.attributes.extend(silent);
            events
        };
        for event in &events {
            self.publish(event);
        }
        true
    }

    fn attribute(&self, key: &str) -> CoreResult<&Attribute> {
        self.kind
            .schema
            .get(key)
            .ok_or_else(|| CoreError::unknown_attribute(key))
    }

    fn removed(&self) -> CoreError {
        CoreError::InstanceRemoved {
            id: self.id.to_string(),
        }
    }

    fn publish(&self, event: &ModelEvent) {
        self.events.emit(event);
        self.kind.events.emit(event);
    }
}

impl std::fmt::Debug for ModelInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ModelInstance")
            .field("model", &self.kind.name)
            .field("id", &self.id)
            .field("state", &state.lifecycle)
            .field("attributes", &state.attributes)
            .finish_non_exhaustive()
    }
}

/// Schema defaults overlaid with the stored values of declared attributes.
fn attributes_from(schema: &Schema, stored: Props) -> Props {
    let mut attributes = schema.defaults();
    for (key, value) in stored {
        if let Some(slot) = attributes.get_mut(&key) {
            *slot = value;
        }
    }
    attributes
}

fn persisted_attributes(schema: &Schema, attributes: &Props) -> Props {
    schema
        .iter()
        .filter(|a| a.is_persisted())
        .filter_map(|a| {
            attributes
                .get(a.name())
                .map(|v| (a.name().to_string(), v.clone()))
        })
        .collect()
}
