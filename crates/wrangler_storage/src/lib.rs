//! # Wrangler Storage
//!
//! Ordered key-value store trait and implementations for Wrangler.
//!
//! This crate provides the lowest-level storage abstraction for Wrangler.
//! Stores are **opaque ordered byte maps** - they do not interpret the keys
//! or values they hold.
//!
//! ## Design Principles
//!
//! - Stores offer get, atomic batch writes and paged range scans
//! - No knowledge of models, records, indexes or key layout
//! - Must be `Send + Sync` for concurrent access
//! - Wrangler owns all key and value interpretation
//!
//! ## Available Stores
//!
//! - [`MemoryStore`] - For testing and ephemeral data
//! - [`FileStore`] - For persistent data, backed by an append-only log
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use wrangler_storage::{KeyRange, KvStore, MemoryStore, Scan, WriteBatch};
//!
//! let store = Arc::new(MemoryStore::new());
//! let mut batch = WriteBatch::new();
//! batch.put(b"user:1".to_vec(), b"alice".to_vec());
//! batch.put(b"user:2".to_vec(), b"bob".to_vec());
//! store.write(batch).unwrap();
//!
//! let scan = Scan::new(store, KeyRange::prefix(b"user:".to_vec()), 16);
//! assert_eq!(scan.count(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod error;
mod file;
mod memory;
mod range;
mod scan;
mod store;

pub use batch::{BatchOp, WriteBatch};
pub use error::{StorageError, StorageResult};
pub use file::{FileStore, FileStoreOptions, LOG_MAGIC, LOG_VERSION};
pub use memory::MemoryStore;
pub use range::{key_successor, prefix_successor, KeyRange};
pub use scan::{Scan, DEFAULT_PAGE_SIZE};
pub use store::{KvPair, KvStore};
