//! Store failures and closed handles.

mod common;

use common::{named, user_schema};
use std::sync::Arc;
use wrangler_core::{Config, CoreError, InstanceState, KvStore, Value, Wrangler};
use wrangler_storage::MemoryStore;
use wrangler_testkit::{init_tracing, FaultyStore};

fn faulty() -> (Arc<FaultyStore<MemoryStore>>, Wrangler) {
    init_tracing();
    let store = Arc::new(FaultyStore::new(MemoryStore::new()));
    let db = Wrangler::new(store.clone() as Arc<dyn KvStore>, Config::default()).unwrap();
    (store, db)
}

#[test]
fn failed_save_keeps_change_log() {
    let (store, db) = faulty();
    let users = db.factory("user", user_schema()).unwrap();
    let user = users.create(&named("ada")).unwrap();
    let pending = user.pending_changes();

    store.fail_next_writes(1);
    let err = users.save(&user).unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(user.pending_changes(), pending);
    assert_eq!(user.state(), InstanceState::New);
    assert!(users.find_by("username", "ada").unwrap().is_none());

    users.save(&user).unwrap();
    assert_eq!(user.state(), InstanceState::Saved);
    assert_eq!(user.pending_changes(), 0);
    assert!(users.find_by("username", "ada").unwrap().is_some());
}

#[test]
fn failed_update_keeps_old_index_entry() {
    let (store, db) = faulty();
    let users = db.factory("user", user_schema()).unwrap();
    let user = users.create(&named("ada")).unwrap();
    users.save(&user).unwrap();

    user.set("username", "lovelace").unwrap();
    store.fail_next_writes(1);
    assert!(users.save(&user).is_err());

    assert!(users.find_by("username", "ada").unwrap().is_some());
    assert!(users.find_by("username", "lovelace").unwrap().is_none());
    let change = &user.changes()[0];
    assert_eq!(change.old_value, Value::from("ada"));
    assert_eq!(change.new_value, Value::from("lovelace"));
}

#[test]
fn failed_remove_keeps_instance() {
    let (store, db) = faulty();
    let users = db.factory("user", user_schema()).unwrap();
    let user = users.create(&named("ada")).unwrap();
    users.save(&user).unwrap();

    store.fail_next_writes(1);
    assert!(users.remove(&user).is_err());
    assert_eq!(user.state(), InstanceState::Saved);
    assert_eq!(users.cache_len(), 1);
    assert!(users.find_by("username", "ada").unwrap().is_some());
}

#[test]
fn closed_handle_rejects_operations() {
    let db = Wrangler::open_in_memory().unwrap();
    let users = db.factory("user", user_schema()).unwrap();
    let user = users.create(&named("ada")).unwrap();
    users.save(&user).unwrap();

    db.close().unwrap();
    db.close().unwrap();
    assert!(!db.is_open());

    assert!(matches!(users.create(&named("b")), Err(CoreError::Closed)));
    assert!(matches!(users.find(user.id()), Err(CoreError::Closed)));
    assert!(matches!(users.find_all(), Err(CoreError::Closed)));
    assert!(matches!(
        users.find_by("username", "ada"),
        Err(CoreError::Closed)
    ));
    assert!(matches!(user.save(), Err(CoreError::Closed)));
    assert!(matches!(user.remove(), Err(CoreError::Closed)));
    assert!(matches!(
        db.factory("post", user_schema()),
        Err(CoreError::Closed)
    ));
}
