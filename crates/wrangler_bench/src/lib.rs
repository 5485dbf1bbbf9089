//! Benchmark utilities.

use rand::distributions::Alphanumeric;
use rand::Rng;
use wrangler_core::{Attribute, Factory, Props, Schema, Value, Wrangler};

/// Generate a random alphanumeric string.
pub fn random_text(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate random value bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Schema used by the model benchmarks: one unique indexed handle and a
/// few plain attributes.
pub fn user_schema() -> Schema {
    let attributes = [
        Attribute::new("handle").indexed().required(),
        Attribute::new("email"),
        Attribute::new("age"),
        Attribute::new("bio"),
    ];
    attributes
        .into_iter()
        .try_fold(Schema::new(), Schema::with)
        .expect("benchmark schema is valid")
}

/// Props for a user with the given handle.
pub fn user_props(handle: &str) -> Props {
    let mut props = Props::new();
    props.insert("handle".into(), Value::from(handle));
    props.insert("email".into(), Value::from(format!("{handle}@example.com")));
    props.insert("age".into(), Value::from(rand::thread_rng().gen_range(18_i64..90)));
    props.insert("bio".into(), Value::from(random_text(64)));
    props
}

/// Open an in-memory handle and save `count` users.
pub fn populated_users(count: usize) -> (Wrangler, Factory, Vec<wrangler_core::ModelId>) {
    let db = Wrangler::open_in_memory().expect("open in-memory store");
    let users = db.factory("user", user_schema()).expect("bind user model");
    let ids = (0..count)
        .map(|i| {
            let user = users
                .create(&user_props(&format!("user{i:06}")))
                .expect("create user");
            users.save(&user).expect("save user");
            user.id().clone()
        })
        .collect();
    (db, users, ids)
}
