//! Factories: the entry point for one model kind.
//!
//! A [`Factory`] creates, finds, saves and removes instances of one model
//! kind, and keeps an in-process cache of instances it has handed out.
//!
//! # Cache discipline
//!
//! - `create` and `find` insert into the cache unless told otherwise
//! - a cache hit returns immediately and queues a background re-read of the
//!   record; the re-read never overwrites an instance with unsaved changes
//! - `remove` evicts the instance, and a cache hit on an instance removed
//!   directly is evicted and read through
//! - `find_all` and the index queries never read or fill the cache
//!
//! Background re-reads run on one worker thread per factory. The worker
//! holds only a weak reference and exits once the factory is dropped.

use crate::config::{CreateOptions, FindOptions};
use crate::error::{CoreError, CoreResult};
use crate::events::ModelEvent;
use crate::id::ModelId;
use crate::index::IndexScan;
use crate::instance::{InstanceState, ModelInstance, RefreshOutcome};
use crate::model::ModelKind;
use crate::record::Record;
use crate::schema::Schema;
use crate::value::{Props, Value};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Weak};
use std::thread;
use wrangler_storage::Scan;

/// Shared handle on one model kind.
///
/// Cloning a factory is cheap; clones share the cache.
#[derive(Clone)]
pub struct Factory {
    inner: Arc<FactoryInner>,
}

struct FactoryInner {
    kind: Arc<ModelKind>,
    cache: RwLock<Vec<Arc<ModelInstance>>>,
    refresher: Mutex<Option<Sender<RefreshMsg>>>,
    pending: Mutex<HashSet<ModelId>>,
}

enum RefreshMsg {
    Refresh(ModelId),
    Barrier(Sender<()>),
}

impl Factory {
    pub(crate) fn new(kind: ModelKind) -> Self {
        Self {
            inner: Arc::new(FactoryInner {
                kind: Arc::new(kind),
                cache: RwLock::new(Vec::new()),
                refresher: Mutex::new(None),
                pending: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Returns the model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.kind.name
    }

    /// Returns the bound schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.inner.kind.schema
    }

    /// Subscribes to the events of every instance of this kind.
    pub fn subscribe(&self) -> Receiver<ModelEvent> {
        self.inner.kind.events.subscribe()
    }

    /// Creates a new instance and caches it.
    ///
    /// # Errors
    ///
    /// See [`Factory::create_with`].
    pub fn create(&self, props: &Props) -> CoreResult<Arc<ModelInstance>> {
        self.create_with(
            props,
            CreateOptions {
                cache: self.inner.kind.config.cache,
            },
        )
    }

    /// Creates a new instance.
    ///
    /// Declared attributes missing from `props` take their schema default.
    /// Keys starting with `_` become private properties. `props` is copied,
    /// so later changes to it do not reach the instance.
    ///
    /// # Errors
    ///
    /// Returns `ReservedKeyConflict` for reserved member names and
    /// `UnknownAttribute` for undeclared keys.
    pub fn create_with(
        &self,
        props: &Props,
        options: CreateOptions,
    ) -> CoreResult<Arc<ModelInstance>> {
        self.inner.kind.ensure_open()?;
        let instance = ModelInstance::create(Arc::clone(&self.inner.kind), props)?;
        if options.cache {
            self.push_to_cache(Arc::clone(&instance));
        }
        Ok(instance)
    }

    /// Saves an instance of this kind and returns the written record.
    ///
    /// # Errors
    ///
    /// Returns `MissingId`, `ForeignModel`, or any error of
    /// [`ModelInstance::save`].
    pub fn save(&self, model: &ModelInstance) -> CoreResult<Record> {
        self.check_owned(model)?;
        model.save()
    }

    /// Removes an instance of this kind and evicts it from the cache.
    ///
    /// # Errors
    ///
    /// Returns `MissingId`, `ForeignModel`, or any error of
    /// [`ModelInstance::remove`].
    pub fn remove(&self, model: &ModelInstance) -> CoreResult<()> {
        self.check_owned(model)?;
        model.remove()?;
        self.evict(model.id());
        Ok(())
    }

    /// Finds an instance by id, consulting the cache.
    ///
    /// # Errors
    ///
    /// See [`Factory::find_with`].
    pub fn find(&self, id: &ModelId) -> CoreResult<Arc<ModelInstance>> {
        self.find_with(
            id,
            FindOptions {
                cache: self.inner.kind.config.cache,
            },
        )
    }

    /// Finds an instance by id.
    ///
    /// With `cache` set, a cached instance is returned without touching the
    /// store, and a miss is read through and cached. Without it the store is
    /// always read and the cache is left alone.
    ///
    /// # Errors
    ///
    /// Returns `MissingId` for an empty id, `NotFound` if no record exists,
    /// or a store error.
    pub fn find_with(&self, id: &ModelId, options: FindOptions) -> CoreResult<Arc<ModelInstance>> {
        if id.is_empty() {
            return Err(CoreError::MissingId);
        }
        let kind = &self.inner.kind;
        kind.ensure_open()?;

        if options.cache {
            match self.cached_instance(id) {
                // Removed behind the factory's back
                Some(hit) if hit.state() == InstanceState::Removed => {
                    self.evict(id);
                    tracing::debug!(model = %kind.name, id = %id, "evicted removed instance");
                }
                Some(hit) => {
                    tracing::trace!(model = %kind.name, id = %id, "cache hit");
                    if kind.config.refresh_on_hit {
                        self.queue_refresh(&hit);
                    }
                    return Ok(hit);
                }
                None => {}
            }
        }

        let record = kind
            .read_record(id)?
            .ok_or_else(|| CoreError::not_found(kind.name.as_str(), id.as_str()))?;
        let instance = ModelInstance::from_record(Arc::clone(kind), record);
        tracing::debug!(model = %kind.name, id = %id, cached = options.cache, "loaded instance");

        if options.cache {
            return Ok(self.cache_or_existing(instance));
        }
        Ok(instance)
    }

    /// Finds the instance holding `value` in indexed attribute `attribute`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAttribute` if the attribute is not declared,
    /// `InvalidValue` if it is not indexed, or a store error.
    pub fn find_by(
        &self,
        attribute: &str,
        value: impl Into<Value>,
    ) -> CoreResult<Option<Arc<ModelInstance>>> {
        self.check_indexed(attribute)?;
        let kind = &self.inner.kind;
        kind.ensure_open()?;
        let Some(id) = kind.index.lookup(attribute, &value.into())? else {
            return Ok(None);
        };
        match self.find(&id) {
            Ok(instance) => Ok(Some(instance)),
            Err(CoreError::NotFound { .. }) => {
                tracing::warn!(model = %kind.name, attribute, id = %id, "index entry without record");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Lazily yields every instance with a value for `attribute`, in token
    /// order.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAttribute` or `InvalidValue` as [`Factory::find_by`].
    pub fn find_all_by(&self, attribute: &str) -> CoreResult<IndexedModels> {
        self.check_indexed(attribute)?;
        self.inner.kind.ensure_open()?;
        let scan = self.inner.kind.index.scan_ids(attribute);
        Ok(IndexedModels::new(Arc::clone(&self.inner.kind), scan))
    }

    /// Lazily yields instances whose `attribute` token lies in
    /// `[lower, upper]`, in token order. Open bounds are `None`.
    ///
    /// Tokens compare as text, so `"10"` sorts before `"9"`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAttribute` or `InvalidValue` as [`Factory::find_by`].
    pub fn find_range_by(
        &self,
        attribute: &str,
        lower: Option<Value>,
        upper: Option<Value>,
    ) -> CoreResult<IndexedModels> {
        self.check_indexed(attribute)?;
        self.inner.kind.ensure_open()?;
        let scan = self
            .inner
            .kind
            .index
            .scan_range(attribute, lower.as_ref(), upper.as_ref())?;
        Ok(IndexedModels::new(Arc::clone(&self.inner.kind), scan))
    }

    /// Lazily yields every stored instance of this kind, in id order.
    ///
    /// The stream pages through the store and never consults or fills the
    /// cache. Dropping it stops the scan.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the handle has been closed.
    pub fn find_all(&self) -> CoreResult<ModelStream> {
        self.inner.kind.ensure_open()?;
        Ok(ModelStream {
            kind: Arc::clone(&self.inner.kind),
            scan: self.inner.kind.record_scan(),
        })
    }

    /// Returns the persisted attributes of `model`.
    #[must_use]
    pub fn serialize(&self, model: &ModelInstance) -> Props {
        model.serialize()
    }

    /// Encodes `model` as stored record bytes.
    ///
    /// # Errors
    ///
    /// Returns `Encoding` if CBOR serialization fails.
    pub fn encode(&self, model: &ModelInstance) -> CoreResult<Vec<u8>> {
        model.to_record().encode()
    }

    /// Rebuilds an instance from stored record bytes, keeping its id.
    ///
    /// The instance is not cached.
    ///
    /// # Errors
    ///
    /// Returns `MissingId` if the record has no id, or `Encoding` for
    /// malformed bytes.
    pub fn deserialize(&self, bytes: &[u8]) -> CoreResult<Arc<ModelInstance>> {
        let record = Record::decode(bytes)?;
        Ok(ModelInstance::from_record(
            Arc::clone(&self.inner.kind),
            record,
        ))
    }

    /// Returns the cache position of an instance with `model`'s id.
    #[must_use]
    pub fn find_cache_index(&self, model: &ModelInstance) -> Option<usize> {
        self.inner
            .cache
            .read()
            .iter()
            .position(|m| m.id() == model.id())
    }

    /// Caches `model`, replacing any cached instance with the same id in
    /// place. Returns its position.
    pub fn push_to_cache(&self, model: Arc<ModelInstance>) -> usize {
        let mut cache = self.inner.cache.write();
        match cache.iter().position(|m| m.id() == model.id()) {
            Some(pos) => {
                cache[pos] = model;
                pos
            }
            None => {
                cache.push(model);
                cache.len() - 1
            }
        }
    }

    /// Removes `model` from the cache, keeping the order of the rest.
    ///
    /// # Errors
    ///
    /// Returns `NotInCache` if no instance with its id is cached.
    pub fn remove_from_cache(&self, model: &ModelInstance) -> CoreResult<Arc<ModelInstance>> {
        self.evict(model.id()).ok_or(CoreError::NotInCache)
    }

    /// Evicts the cached instance with `id`, if any.
    pub fn evict(&self, id: &ModelId) -> Option<Arc<ModelInstance>> {
        let mut cache = self.inner.cache.write();
        let pos = cache.iter().position(|m| m.id() == id)?;
        Some(cache.remove(pos))
    }

    /// Returns the number of cached instances.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.inner.cache.read().len()
    }

    /// Returns the cached instances in insertion order.
    #[must_use]
    pub fn cached(&self) -> Vec<Arc<ModelInstance>> {
        self.inner.cache.read().clone()
    }

    /// Empties the cache.
    pub fn clear_cache(&self) {
        self.inner.cache.write().clear();
    }

    /// Blocks until every queued background refresh has been applied.
    pub fn sync_refreshes(&self) {
        let Some(sender) = self.inner.refresher.lock().clone() else {
            return;
        };
        let (done_tx, done_rx) = mpsc::channel();
        if sender.send(RefreshMsg::Barrier(done_tx)).is_ok() {
            // An error means the worker exited, which also drains the queue
            let _ = done_rx.recv();
        }
    }

    fn check_owned(&self, model: &ModelInstance) -> CoreResult<()> {
        if model.id().is_empty() {
            return Err(CoreError::MissingId);
        }
        if !Arc::ptr_eq(model.kind(), &self.inner.kind) {
            return Err(CoreError::ForeignModel {
                expected: self.name().to_string(),
                actual: model.model_name().to_string(),
            });
        }
        Ok(())
    }

    fn check_indexed(&self, attribute: &str) -> CoreResult<()> {
        let attr = self
            .schema()
            .get(attribute)
            .ok_or_else(|| CoreError::unknown_attribute(attribute))?;
        if !attr.is_indexed() || !attr.is_persisted() {
            return Err(CoreError::invalid_value(attribute, "attribute is not indexed"));
        }
        Ok(())
    }

    fn cached_instance(&self, id: &ModelId) -> Option<Arc<ModelInstance>> {
        self.inner
            .cache
            .read()
            .iter()
            .find(|m| m.id() == id)
            .cloned()
    }

    /// Caches `instance` unless a concurrent find got there first.
    fn cache_or_existing(&self, instance: Arc<ModelInstance>) -> Arc<ModelInstance> {
        let mut cache = self.inner.cache.write();
        if let Some(existing) = cache.iter().find(|m| m.id() == instance.id()) {
            return Arc::clone(existing);
        }
        cache.push(Arc::clone(&instance));
        instance
    }

    fn queue_refresh(&self, instance: &ModelInstance) {
        if instance.state() != InstanceState::Saved || instance.is_dirty() {
            return;
        }
        if !self.inner.pending.lock().insert(instance.id().clone()) {
            return;
        }
        let sender = self.refresher();
        if sender.send(RefreshMsg::Refresh(instance.id().clone())).is_err() {
            self.inner.pending.lock().remove(instance.id());
        }
    }

    fn refresher(&self) -> Sender<RefreshMsg> {
        let mut slot = self.inner.refresher.lock();
        if let Some(sender) = slot.as_ref() {
            return sender.clone();
        }
        let (sender, receiver) = mpsc::channel();
        let weak = Arc::downgrade(&self.inner);
        let spawned = thread::Builder::new()
            .name(format!("wrangler-refresh-{}", self.name()))
            .spawn(move || refresh_worker(&weak, &receiver));
        if let Err(e) = spawned {
            tracing::warn!(model = %self.name(), error = %e, "could not start refresh worker");
        }
        *slot = Some(sender.clone());
        sender
    }
}

impl std::fmt::Debug for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factory")
            .field("name", &self.name())
            .field("cached", &self.cache_len())
            .finish_non_exhaustive()
    }
}

fn refresh_worker(factory: &Weak<FactoryInner>, receiver: &Receiver<RefreshMsg>) {
    while let Ok(msg) = receiver.recv() {
        match msg {
            RefreshMsg::Barrier(done) => {
                let _ = done.send(());
            }
            RefreshMsg::Refresh(id) => {
                let Some(inner) = factory.upgrade() else {
                    break;
                };
                inner.pending.lock().remove(&id);
                inner.refresh(&id);
            }
        }
    }
}

impl FactoryInner {
    fn refresh(&self, id: &ModelId) {
        let Some(cached) = self.cache.read().iter().find(|m| m.id() == id).cloned() else {
            return;
        };
        match cached.refresh() {
            Ok(RefreshOutcome::Applied) => {
                tracing::trace!(model = %self.kind.name, id = %id, "refreshed cached instance");
            }
            Ok(RefreshOutcome::Skipped) => {}
            Ok(RefreshOutcome::Gone) => {
                let mut cache = self.cache.write();
                if let Some(pos) = cache.iter().position(|m| Arc::ptr_eq(m, &cached)) {
                    cache.remove(pos);
                }
                tracing::debug!(model = %self.kind.name, id = %id, "evicted instance with no record");
            }
            Err(e) => {
                tracing::warn!(model = %self.kind.name, id = %id, error = %e, "cache refresh failed");
            }
        }
    }
}

/// Lazy stream over every record of a model kind.
///
/// Created by [`Factory::find_all`].
pub struct ModelStream {
    kind: Arc<ModelKind>,
    scan: Scan,
}

impl ModelStream {
    /// Rewinds to the first record.
    pub fn restart(&mut self) {
        self.scan.restart();
    }

    /// Returns how many pages have been read from the store.
    #[must_use]
    pub fn pages_fetched(&self) -> usize {
        self.scan.pages_fetched()
    }
}

impl Iterator for ModelStream {
    type Item = CoreResult<Arc<ModelInstance>>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.scan.next()?;
        Some(item.map_err(CoreError::from).and_then(|(_, bytes)| {
            let record = Record::decode(&bytes)?;
            Ok(ModelInstance::from_record(Arc::clone(&self.kind), record))
        }))
    }
}

impl std::fmt::Debug for ModelStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelStream")
            .field("model", &self.kind.name)
            .field("scan", &self.scan)
            .finish()
    }
}

/// Lazy stream of instances in index order.
///
/// Created by [`Factory::find_all_by`] and [`Factory::find_range_by`].
/// Entries whose record has disappeared are skipped.
#[derive(Debug)]
pub struct IndexedModels {
    kind: Arc<ModelKind>,
    scan: IndexScan,
}

impl IndexedModels {
    fn new(kind: Arc<ModelKind>, scan: IndexScan) -> Self {
        Self { kind, scan }
    }

    /// Rewinds to the first entry.
    pub fn restart(&mut self) {
        self.scan.restart();
    }
}

impl Iterator for IndexedModels {
    type Item = CoreResult<Arc<ModelInstance>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.scan.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e)),
            };
            match self.kind.read_record(&entry.id) {
                Ok(Some(record)) => {
                    return Some(Ok(ModelInstance::from_record(
                        Arc::clone(&self.kind),
                        record,
                    )))
                }
                Ok(None) => {
                    tracing::warn!(model = %self.kind.name, id = %entry.id, "index entry without record");
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
