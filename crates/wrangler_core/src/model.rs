//! State shared by a factory and all of its instances.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::events::EventBus;
use crate::id::ModelId;
use crate::index::IndexStore;
use crate::keys::KeySpace;
use crate::lock::KeyLocks;
use crate::record::Record;
use crate::schema::Schema;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use wrangler_storage::{KvStore, Scan};

/// One model kind: its schema bound to a store.
pub(crate) struct ModelKind {
    pub(crate) name: String,
    pub(crate) schema: Arc<Schema>,
    pub(crate) store: Arc<dyn KvStore>,
    pub(crate) keys: KeySpace,
    pub(crate) index: IndexStore,
    pub(crate) locks: KeyLocks,
    pub(crate) config: Config,
    pub(crate) events: EventBus,
    closed: Arc<AtomicBool>,
}

impl ModelKind {
    /// Binds `schema` under `name`.
    ///
    /// Every attribute name is checked against the key layout.
    pub(crate) fn new(
        name: &str,
        schema: Schema,
        store: Arc<dyn KvStore>,
        config: Config,
        closed: Arc<AtomicBool>,
    ) -> CoreResult<Self> {
        let keys = KeySpace::new(name, config.separator)?;
        for attribute in &schema {
            keys.check_attribute(attribute.name())?;
        }
        let index = IndexStore::new(keys.clone(), Arc::clone(&store), config.scan_page_size);

        Ok(Self {
            name: name.to_string(),
            schema: Arc::new(schema),
            store,
            keys,
            index,
            locks: KeyLocks::new(),
            config,
            events: EventBus::new(),
            closed,
        })
    }

    pub(crate) fn ensure_open(&self) -> CoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CoreError::Closed);
        }
        Ok(())
    }

    /// Reads the stored record of `id`.
    pub(crate) fn read_record(&self, id: &ModelId) -> CoreResult<Option<Record>> {
        self.store
            .get(&self.keys.record_key(id))?
            .map(|bytes| Record::decode(&bytes))
            .transpose()
    }

    /// Starts a lazy scan over every record of this kind.
    pub(crate) fn record_scan(&self) -> Scan {
        Scan::new(
            Arc::clone(&self.store),
            self.keys.records_range(),
            self.config.scan_page_size,
        )
    }
}

impl std::fmt::Debug for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelKind")
            .field("name", &self.name)
            .field("attributes", &self.schema.len())
            .finish_non_exhaustive()
    }
}
