//! Presence predicate
//!
//! `has_state` decides whether a state key counts as produced. Context keys on
//! the allow-empty list only need to be loaded (non-null); every other key
//! also needs real content. An empty roster means "looked and found nobody",
//! an empty draft means "nothing was written".

use serde_json::Value;

use super::store::StateStore;

/// Keys whose presence only requires a non-null value
pub const ALLOW_EMPTY_KEYS: &[&str] = &[
    "worldRules",
    "characters",
    "plotState",
    "foreshadows",
    "chapterHistory",
];

/// True if `key` is on the allow-empty list
pub fn is_allow_empty(key: &str) -> bool {
    ALLOW_EMPTY_KEYS.contains(&key)
}

/// True if the value carries content: not null, not a blank string,
/// not an empty array, not an empty object.
pub fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Presence predicate over a dotted key
///
/// Any missing path segment makes the key absent.
pub fn has_state(store: &StateStore, key: &str) -> bool {
    match store.get(key) {
        None | Some(Value::Null) => false,
        Some(value) => is_allow_empty(key) || has_content(value),
    }
}

/// Goal keys that are not yet present, in goal order
pub fn missing_keys<'a, I>(goal: I, store: &StateStore) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    goal.into_iter()
        .filter(|key| !has_state(store, key))
        .cloned()
        .collect()
}

/// True when every goal key is present. An empty goal is trivially satisfied.
pub fn goal_satisfied<'a, I>(goal: I, store: &StateStore) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    goal.into_iter().all(|key| has_state(store, key))
}
