//! Unique secondary indexes: collisions, reconciliation and lookups.

mod common;

use common::{harness, named, props};
use wrangler_core::{CoreError, CreateOptions, FindOptions, KeySpace, Value, DEFAULT_SEPARATOR};

fn index_entries(h: &common::Harness, attribute: &str) -> usize {
    let keys = KeySpace::new("user", DEFAULT_SEPARATOR).unwrap();
    let range = keys.index_range(attribute);
    h.store
        .inner()
        .snapshot()
        .keys()
        .filter(|k| range.contains(k))
        .count()
}

#[test]
fn collision_rejects_second_owner() {
    let h = harness();
    let ada = h.users.create(&named("ada")).unwrap();
    h.users.save(&ada).unwrap();

    let imposter = h.users.create(&named("ada")).unwrap();
    let err = h.users.save(&imposter).unwrap_err();
    match err {
        CoreError::IndexCollision {
            attribute,
            value,
            existing,
        } => {
            assert_eq!(attribute, "username");
            assert_eq!(value, "ada");
            assert_eq!(existing, ada.id().to_string());
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(imposter.is_dirty());
    assert_eq!(index_entries(&h, "username"), 1);
    let owner = h.users.find_by("username", "ada").unwrap().unwrap();
    assert_eq!(owner.id(), ada.id());
}

#[test]
fn collision_on_one_attribute_writes_nothing() {
    let h = harness();
    let ada = h
        .users
        .create(&props(&[
            ("username", Value::from("ada")),
            ("email", Value::from("ada@example.com")),
        ]))
        .unwrap();
    h.users.save(&ada).unwrap();

    let other = h
        .users
        .create(&props(&[
            ("username", Value::from("grace")),
            ("email", Value::from("ada@example.com")),
        ]))
        .unwrap();
    assert!(matches!(
        h.users.save(&other),
        Err(CoreError::IndexCollision { .. })
    ));
    assert!(h.users.find_by("username", "grace").unwrap().is_none());
    assert!(matches!(
        h.users.find_with(other.id(), FindOptions::uncached()),
        Err(CoreError::NotFound { .. })
    ));
}

#[test]
fn resave_is_idempotent() {
    let h = harness();
    let ada = h.users.create(&named("ada")).unwrap();
    h.users.save(&ada).unwrap();
    h.users.save(&ada).unwrap();

    ada.set("username", "ada").unwrap();
    h.users.save(&ada).unwrap();
    assert_eq!(index_entries(&h, "username"), 1);
}

#[test]
fn changing_value_moves_entry() {
    let h = harness();
    let ada = h.users.create(&named("ada")).unwrap();
    h.users.save(&ada).unwrap();

    ada.set("username", "lovelace").unwrap();
    h.users.save(&ada).unwrap();

    assert_eq!(index_entries(&h, "username"), 1);
    assert!(h.users.find_by("username", "ada").unwrap().is_none());
    let found = h.users.find_by("username", "lovelace").unwrap().unwrap();
    assert_eq!(found.id(), ada.id());

    // The released value can be claimed
    let newcomer = h.users.create(&named("ada")).unwrap();
    h.users.save(&newcomer).unwrap();
}

#[test]
fn setting_null_drops_entry() {
    let h = harness();
    let ada = h
        .users
        .create(&props(&[
            ("username", Value::from("ada")),
            ("email", Value::from("ada@example.com")),
        ]))
        .unwrap();
    h.users.save(&ada).unwrap();
    assert_eq!(index_entries(&h, "email"), 1);

    ada.set("email", Value::Null).unwrap();
    h.users.save(&ada).unwrap();
    assert_eq!(index_entries(&h, "email"), 0);
}

#[test]
fn stale_handle_purges_intermediate_value() {
    let h = harness();
    let first = h
        .users
        .create_with(&named("a"), CreateOptions::uncached())
        .unwrap();
    h.users.save(&first).unwrap();
    let second = h.users.find_with(first.id(), FindOptions::uncached()).unwrap();

    first.set("username", "b").unwrap();
    h.users.save(&first).unwrap();
    second.set("username", "c").unwrap();
    h.users.save(&second).unwrap();

    assert_eq!(index_entries(&h, "username"), 1);
    assert!(h.users.find_by("username", "b").unwrap().is_none());
    assert!(h.users.find_by("username", "c").unwrap().is_some());
}

#[test]
fn remove_leaves_no_orphans() {
    let h = harness();
    let ada = h
        .users
        .create(&props(&[
            ("username", Value::from("ada")),
            ("email", Value::from("ada@example.com")),
        ]))
        .unwrap();
    h.users.save(&ada).unwrap();
    ada.set("username", "lovelace").unwrap();
    h.users.save(&ada).unwrap();
    h.users.remove(&ada).unwrap();

    // Only the model registry remains
    let snapshot = h.store.inner().snapshot();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.contains_key(&KeySpace::metadata_key(DEFAULT_SEPARATOR)));
}

#[test]
fn remove_of_dirty_instance_purges_stored_values() {
    let h = harness();
    let ada = h.users.create(&named("ada")).unwrap();
    h.users.save(&ada).unwrap();

    ada.set("username", "unsaved").unwrap();
    h.users.remove(&ada).unwrap();
    assert_eq!(index_entries(&h, "username"), 0);
}

#[test]
fn numbers_are_indexed_as_text() {
    let h = harness();
    let user = h.users.create(&props(&[("username", Value::from(42))])).unwrap();
    h.users.save(&user).unwrap();

    assert!(h.users.find_by("username", 42).unwrap().is_some());
    // Both render as the token "42"
    assert!(h.users.find_by("username", "42").unwrap().is_some());

    let text = h.users.create(&named("42")).unwrap();
    assert!(matches!(
        h.users.save(&text),
        Err(CoreError::IndexCollision { .. })
    ));
}

#[test]
fn unindexable_values_are_rejected() {
    let h = harness();
    let user = h
        .users
        .create(&props(&[(
            "username",
            Value::Array(vec![Value::from("a")]),
        )]))
        .unwrap();
    h.store.reset();
    assert!(matches!(
        h.users.save(&user),
        Err(CoreError::InvalidValue { .. })
    ));
    assert_eq!(h.store.writes(), 0);
}

#[test]
fn find_by_requires_indexed_attribute() {
    let h = harness();
    assert!(matches!(
        h.users.find_by("age", 3),
        Err(CoreError::InvalidValue { .. })
    ));
    assert!(matches!(
        h.users.find_by("nickname", "x"),
        Err(CoreError::UnknownAttribute { .. })
    ));
}

#[test]
fn find_all_by_walks_token_order() {
    let h = harness();
    for name in ["carol", "alice", "bob"] {
        let user = h.users.create(&named(name)).unwrap();
        h.users.save(&user).unwrap();
    }

    let names: Vec<_> = h
        .users
        .find_all_by("username")
        .unwrap()
        .map(|m| m.unwrap().get("username").unwrap())
        .collect();
    assert_eq!(
        names,
        vec![Value::from("alice"), Value::from("bob"), Value::from("carol")]
    );
}

#[test]
fn find_range_by_is_inclusive() {
    let h = harness();
    for name in ["a", "b", "c", "d", "e"] {
        let user = h.users.create(&named(name)).unwrap();
        h.users.save(&user).unwrap();
    }

    let count = |lower: Option<&str>, upper: Option<&str>| {
        h.users
            .find_range_by("username", lower.map(Value::from), upper.map(Value::from))
            .unwrap()
            .count()
    };
    assert_eq!(count(Some("b"), Some("d")), 3);
    assert_eq!(count(None, Some("b")), 2);
    assert_eq!(count(Some("d"), None), 2);
    assert_eq!(count(None, None), 5);
}
