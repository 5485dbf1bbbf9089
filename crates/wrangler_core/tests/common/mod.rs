//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use wrangler_core::{Attribute, Config, Factory, KvStore, Props, Schema, Value, Wrangler};
use wrangler_testkit::{init_tracing, CountingStore};
use wrangler_storage::MemoryStore;

/// `username` (indexed, required), `email` (indexed), `age`,
/// `role` (default "member") and `session` (silent).
pub fn user_schema() -> Schema {
    Schema::new()
        .with(Attribute::new("username").indexed().required())
        .unwrap()
        .with(Attribute::new("email").indexed())
        .unwrap()
        .with(Attribute::new("age"))
        .unwrap()
        .with(Attribute::new("role").default("member"))
        .unwrap()
        .with(Attribute::new("session").silent())
        .unwrap()
}

pub fn props(pairs: &[(&str, Value)]) -> Props {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

pub fn named(username: &str) -> Props {
    props(&[("username", Value::from(username))])
}

pub struct Harness {
    pub store: Arc<CountingStore<MemoryStore>>,
    pub db: Wrangler,
    pub users: Factory,
}

pub fn harness() -> Harness {
    harness_with(Config::default())
}

pub fn harness_with(config: Config) -> Harness {
    init_tracing();
    let store = Arc::new(CountingStore::new(MemoryStore::new()));
    let db = Wrangler::new(store.clone() as Arc<dyn KvStore>, config).unwrap();
    let users = db.factory("user", user_schema()).unwrap();
    Harness { store, db, users }
}
