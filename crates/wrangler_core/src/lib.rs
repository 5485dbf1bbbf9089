//! # Wrangler Core
//!
//! Indexed document models over an ordered key-value store.
//!
//! This crate provides:
//! - Schemas with indexed, required, silent and defaulted attributes
//! - Live model instances that track mutations in a change log
//! - Atomic saves that reconcile unique secondary indexes with the record
//! - Factories with an in-process instance cache kept coherent with the store
//! - Lazy scans over all records or over an index
//!
//! ## Architecture
//!
//! ```text
//! Wrangler ──binds──▶ Factory ──creates/finds──▶ ModelInstance
//!                        │                           │
//!                        └──── ModelKind (schema, KeySpace, IndexStore) ────┘
//!                                        │
//!                                     KvStore
//! ```
//!
//! ## Example
//!
//! ```rust
//! use wrangler_core::{Attribute, CoreError, Props, Schema, Value, Wrangler};
//!
//! let db = Wrangler::open_in_memory().unwrap();
//! let schema = Schema::new()
//!     .with(Attribute::new("username").indexed().required())
//!     .unwrap()
//!     .with(Attribute::new("role").default("member"))
//!     .unwrap();
//! let users = db.factory("user", schema).unwrap();
//!
//! let mut props = Props::new();
//! props.insert("username".into(), Value::from("ada"));
//! let ada = users.create(&props).unwrap();
//! users.save(&ada).unwrap();
//!
//! // Indexed values are unique
//! let imposter = users.create(&props).unwrap();
//! assert!(matches!(users.save(&imposter), Err(CoreError::IndexCollision { .. })));
//!
//! assert_eq!(users.find_all().unwrap().count(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_log;
mod config;
mod error;
mod events;
mod factory;
mod id;
mod index;
mod instance;
mod keys;
mod lock;
mod model;
mod record;
mod schema;
mod value;
mod wrangler;

pub use change_log::{ChangeLog, ChangeRecord, PushOutcome};
pub use config::{Config, CreateOptions, FindOptions, DEFAULT_SEPARATOR};
pub use error::{CoreError, CoreResult};
pub use events::{EventBus, ModelEvent};
pub use factory::{Factory, IndexedModels, ModelStream};
pub use id::ModelId;
pub use index::{IndexEntry, IndexScan, IndexStore};
pub use instance::{InstanceState, ModelInstance};
pub use keys::KeySpace;
pub use lock::{KeyLockGuard, KeyLocks};
pub use record::Record;
pub use schema::{is_private, is_reserved, Attribute, Schema, PRIVATE_PREFIX, RESERVED_NAMES};
pub use value::{Props, Value};
pub use wrangler::Wrangler;

// Re-export store types callers need to open a handle
pub use wrangler_storage::{FileStore, FileStoreOptions, KvStore, MemoryStore, StorageError};
