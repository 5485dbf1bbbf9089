//! # Wrangler Testkit
//!
//! Test utilities for Wrangler.
//!
//! This crate provides:
//! - Store fixtures with automatic cleanup
//! - Instrumented stores that count calls or inject write failures
//! - Property-based test generators using proptest
//! - Tracing setup for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wrangler_testkit::prelude::*;
//!
//! #[test]
//! fn counts_reads() {
//!     init_tracing();
//!     let store = Arc::new(CountingStore::new(MemoryStore::new()));
//!     // ... hand `store.clone()` to a Wrangler handle
//!     assert_eq!(store.gets(), 0);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod instrumented;
pub mod logging;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::instrumented::*;
    pub use crate::logging::*;
    pub use wrangler_storage::{KvStore, MemoryStore};
}

pub use fixtures::*;
pub use generators::*;
pub use instrumented::*;
pub use logging::*;
