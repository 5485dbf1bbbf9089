//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains the key layout's invariants.

use proptest::prelude::*;
use wrangler_storage::{BatchOp, WriteBatch};

/// Strategy for generating valid model and attribute names.
///
/// The inner underscore keeps generated names clear of reserved member
/// names such as `id` or `save`.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,8}_[a-z0-9]{1,7}").expect("Invalid regex")
}

/// Strategy for generating indexable text values.
///
/// Never contains the default separator, which UTF-8 cannot encode anyway.
pub fn token_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9 ._@-]{1,24}").expect("Invalid regex")
}

/// Strategy for generating store keys.
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..32)
}

/// Strategy for generating store values.
pub fn value_bytes_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// Strategy for generating a single batch operation.
pub fn batch_op_strategy() -> impl Strategy<Value = BatchOp> {
    prop_oneof![
        3 => (key_strategy(), value_bytes_strategy())
            .prop_map(|(key, value)| BatchOp::Put { key, value }),
        1 => key_strategy().prop_map(|key| BatchOp::Delete { key }),
    ]
}

/// Strategy for generating write batches of up to `max_ops` operations.
pub fn batch_strategy(max_ops: usize) -> impl Strategy<Value = WriteBatch> {
    prop::collection::vec(batch_op_strategy(), 1..=max_ops.max(1)).prop_map(WriteBatch::from)
}

/// Configuration for property tests.
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a config for quick tests.
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use wrangler_storage::{KvStore, MemoryStore};

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn names_are_nonempty_identifiers(name in name_strategy()) {
            prop_assert!(!name.is_empty());
            prop_assert!(!name.starts_with('_'));
        }

        #[test]
        fn memory_store_matches_model(batches in prop::collection::vec(batch_strategy(8), 1..8)) {
            let store = MemoryStore::new();
            let mut model = BTreeMap::new();
            for batch in batches {
                for op in batch.ops() {
                    match op {
                        BatchOp::Put { key, value } => { model.insert(key.clone(), value.clone()); }
                        BatchOp::Delete { key } => { model.remove(key); }
                    }
                }
                store.write(batch).unwrap();
            }
            prop_assert_eq!(store.snapshot(), model);
        }
    }
}
