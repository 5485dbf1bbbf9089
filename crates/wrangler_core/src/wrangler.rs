//! The database handle.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::factory::Factory;
use crate::keys::KeySpace;
use crate::model::ModelKind;
use crate::schema::Schema;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use wrangler_storage::{FileStore, KvStore, MemoryStore};

/// The main Wrangler handle.
///
/// `Wrangler` binds model schemas to an ordered key-value store and hands
/// out one [`Factory`] per model kind. Model names are recorded in a
/// metadata key so they can be listed after a reopen.
///
/// # Opening
///
/// ```rust,ignore
/// use wrangler_core::{Config, Wrangler};
/// use std::path::Path;
///
/// // Durable, log-backed store in a directory
/// let db = Wrangler::open(Path::new("my_models"), Config::default())?;
///
/// // Or ephemeral, for tests
/// let db = Wrangler::open_in_memory()?;
/// ```
///
/// # Example
///
/// ```rust
/// use wrangler_core::{Attribute, Props, Schema, Value, Wrangler};
///
/// let db = Wrangler::open_in_memory().unwrap();
/// let users = db
///     .factory(
///         "user",
///         Schema::new()
///             .with(Attribute::new("username").indexed().required())
///             .unwrap(),
///     )
///     .unwrap();
///
/// let mut props = Props::new();
/// props.insert("username".into(), Value::from("ada"));
/// let ada = users.create(&props).unwrap();
/// users.save(&ada).unwrap();
///
/// let found = users.find_by("username", "ada").unwrap().unwrap();
/// assert_eq!(found.id(), ada.id());
/// ```
pub struct Wrangler {
    store: Arc<dyn KvStore>,
    config: Config,
    factories: Mutex<HashMap<String, Factory>>,
    closed: Arc<AtomicBool>,
}

impl Wrangler {
    /// Creates a handle over an existing store.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` if the configured separator is an ASCII letter
    /// or digit, which would collide with the key layout tags.
    pub fn new(store: Arc<dyn KvStore>, config: Config) -> CoreResult<Self> {
        if config.separator.is_ascii_alphanumeric() {
            return Err(CoreError::invalid_name(
                format!("{:#04x}", config.separator),
                "separator cannot be an ASCII letter or digit",
            ));
        }
        Ok(Self {
            store,
            config,
            factories: Mutex::new(HashMap::new()),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Opens or creates a durable store directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another process holds the directory (`Storage(Locked)`)
    /// - I/O errors occur while replaying the store log
    pub fn open(path: &Path, config: Config) -> CoreResult<Self> {
        let store = FileStore::open(path)?;
        tracing::info!(path = %path.display(), keys = store.len(), "opened wrangler store");
        Self::new(Arc::new(store), config)
    }

    /// Opens a handle over a fresh in-memory store.
    ///
    /// # Errors
    ///
    /// Never fails with the default configuration.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::new(Arc::new(MemoryStore::new()), Config::default())
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Binds `schema` under model name `name` and returns its factory.
    ///
    /// # Errors
    ///
    /// - `Closed` after [`Wrangler::close`]
    /// - `ModelExists` if `name` is already bound on this handle
    /// - `InvalidName` if the name or an attribute name is unusable
    /// - store errors while recording the name
    pub fn factory(&self, name: &str, schema: Schema) -> CoreResult<Factory> {
        self.ensure_open()?;
        let mut factories = self.factories.lock();
        if factories.contains_key(name) {
            return Err(CoreError::ModelExists {
                name: name.to_string(),
            });
        }

        let kind = ModelKind::new(
            name,
            schema,
            Arc::clone(&self.store),
            self.config.clone(),
            Arc::clone(&self.closed),
        )?;
        self.register_model(name)?;

        let factory = Factory::new(kind);
        factories.insert(name.to_string(), factory.clone());
        tracing::debug!(model = name, "bound model");
        Ok(factory)
    }

    /// Returns the factory bound under `name` on this handle.
    #[must_use]
    pub fn get_factory(&self, name: &str) -> Option<Factory> {
        self.factories.lock().get(name).cloned()
    }

    /// Returns every model name ever bound to this store, sorted.
    ///
    /// # Errors
    ///
    /// Returns a store or decoding error.
    pub fn models(&self) -> CoreResult<Vec<String>> {
        self.read_models()
    }

    /// Flushes the store and closes the handle.
    ///
    /// Factories and instances of this handle fail with `Closed` afterwards.
    /// Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a store error if the flush fails.
    pub fn close(&self) -> CoreResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.store.flush()?;
        tracing::info!("closed wrangler");
        Ok(())
    }

    /// Returns true until [`Wrangler::close`] is called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CoreError::Closed)
        }
    }

    fn read_models(&self) -> CoreResult<Vec<String>> {
        match self.store.get(&KeySpace::metadata_key(self.config.separator))? {
            Some(bytes) => ciborium::from_reader(bytes.as_slice()).map_err(CoreError::encoding),
            None => Ok(Vec::new()),
        }
    }

    /// Records `name` in the metadata key. Called with the factory map
    /// locked, which serializes writers of the key.
    fn register_model(&self, name: &str) -> CoreResult<()> {
        let mut models = self.read_models()?;
        if let Err(pos) = models.binary_search_by(|m| m.as_str().cmp(name)) {
            models.insert(pos, name.to_string());
            let mut bytes = Vec::new();
            ciborium::into_writer(&models, &mut bytes).map_err(CoreError::encoding)?;
            self.store
                .put(&KeySpace::metadata_key(self.config.separator), &bytes)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Wrangler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wrangler")
            .field("config", &self.config)
            .field("models", &self.factories.lock().len())
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;

    fn schema() -> Schema {
        Schema::new().with(Attribute::new("name")).unwrap()
    }

    #[test]
    fn binding_twice_fails() {
        let db = Wrangler::open_in_memory().unwrap();
        db.factory("user", schema()).unwrap();
        assert!(matches!(
            db.factory("user", schema()),
            Err(CoreError::ModelExists { .. })
        ));
        assert!(db.get_factory("user").is_some());
    }

    #[test]
    fn models_are_recorded_sorted() {
        let db = Wrangler::open_in_memory().unwrap();
        db.factory("post", schema()).unwrap();
        db.factory("comment", schema()).unwrap();
        assert_eq!(db.models().unwrap(), ["comment", "post"]);
    }

    #[test]
    fn closed_handle_rejects_work() {
        let db = Wrangler::open_in_memory().unwrap();
        let users = db.factory("user", schema()).unwrap();
        db.close().unwrap();
        db.close().unwrap();

        assert!(!db.is_open());
        assert!(matches!(db.factory("post", schema()), Err(CoreError::Closed)));
        assert!(matches!(users.create(&Default::default()), Err(CoreError::Closed)));
    }

    #[test]
    fn alphanumeric_separator_rejected() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        assert!(Wrangler::new(store, Config::new().separator(b'r')).is_err());
    }

    #[test]
    fn separator_in_attribute_name_rejected() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let db = Wrangler::new(store, Config::new().separator(b'|')).unwrap();
        let schema = Schema::new().with(Attribute::new("a|b")).unwrap();
        assert!(matches!(
            db.factory("user", schema),
            Err(CoreError::InvalidName { .. })
        ));
    }
}
