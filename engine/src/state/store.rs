//! Task-scoped State Store
//!
//! A blackboard of named, possibly nested JSON values addressed by dotted
//! keys (`checkResults.overall`). One store belongs to one task: it is
//! created when the task starts, mutated only by applying skill outputs, and
//! discarded or saved when the task ends or is suspended.

use regex::Regex;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::OnceLock;

use super::presence;

const KEY_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z0-9_]+)*$";

fn key_regex() -> &'static Regex {
    static KEY_RE: OnceLock<Regex> = OnceLock::new();
    KEY_RE.get_or_init(|| Regex::new(KEY_PATTERN).expect("state key pattern is valid"))
}

/// Check that `key` is a well-formed dotted state key
pub fn validate_key(key: &str) -> Result<(), EngineError> {
    if key_regex().is_match(key) {
        Ok(())
    } else {
        Err(EngineError::InvalidStateKey(key.to_string()))
    }
}

/// Shared blackboard for one task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateStore {
    root: Map<String, Value>,
}

impl StateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a JSON object (used for seeded / resumed state)
    pub fn from_value(value: Value) -> Result<Self, EngineError> {
        match value {
            Value::Object(root) => Ok(Self { root }),
            Value::Null => Ok(Self::new()),
            other => Err(EngineError::InvalidStateKey(format!(
                "state root must be an object, got {}",
                type_name(&other)
            ))),
        }
    }

    /// Borrow the root object
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    /// Root keys currently held
    pub fn root_keys(&self) -> impl Iterator<Item = &str> {
        self.root.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Look up a dotted key. Any missing segment yields `None`.
    ///
    /// Numeric segments index into arrays.
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut segments = key.split('.');
        let first = segments.next()?;
        let mut current = self.root.get(first)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Look up a dotted key and clone the value, `Null` when absent
    pub fn get_or_null(&self, key: &str) -> Value {
        self.get(key).cloned().unwrap_or(Value::Null)
    }

    /// Presence predicate (see [`presence::has_state`])
    pub fn has_state(&self, key: &str) -> bool {
        presence::has_state(self, key)
    }

    /// Write a value at a dotted key, creating intermediate objects.
    ///
    /// An intermediate segment holding a non-object value is replaced by an
    /// object.
    pub fn set(&mut self, key: &str, value: Value) -> Result<(), EngineError> {
        validate_key(key)?;
        let segments: Vec<&str> = key.split('.').collect();
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| EngineError::InvalidStateKey(key.to_string()))?;

        let mut current = &mut self.root;
        for segment in parents {
            let slot = current
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            current = match slot {
                Value::Object(map) => map,
                _ => unreachable!("slot was just made an object"),
            };
        }
        current.insert((*last).to_string(), value);
        Ok(())
    }

    /// Apply a batch of updates as one unit.
    ///
    /// All keys are validated before anything is written, so a malformed
    /// batch leaves the store untouched.
    pub fn apply(&mut self, updates: &Map<String, Value>) -> Result<(), EngineError> {
        for key in updates.keys() {
            validate_key(key)?;
        }
        let mut next = self.clone();
        for (key, value) in updates {
            next.set(key, value.clone())?;
        }
        *self = next;
        Ok(())
    }

    /// Remove a root key
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.root.remove(key)
    }

    /// Compact one-line-per-key presence summary for prompts
    pub fn presence_summary<'a, I>(&self, keys: I) -> String
    where
        I: IntoIterator<Item = &'a str>,
    {
        keys.into_iter()
            .map(|key| {
                let mark = if self.has_state(key) { "present" } else { "absent" };
                format!("- {}: {}", key, mark)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Serialize the store to a JSON file (task suspend)
    pub async fn save(&self, path: &Path) -> Result<(), EngineError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Load a store previously written by [`StateStore::save`]
    pub async fn load(path: &Path) -> Result<Self, EngineError> {
        let contents = tokio::fs::read_to_string(path).await?;
        let value: Value = serde_json::from_str(&contents)?;
        Self::from_value(value)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("draftContent").is_ok());
        assert!(validate_key("checkResults.overall").is_ok());
        assert!(validate_key("a.0.b").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key(".leading").is_err());
        assert!(validate_key("trailing.").is_err());
        assert!(validate_key("has space").is_err());
    }

    #[test]
    fn test_get_nested_and_array_index() {
        let store = StateStore::from_value(json!({
            "checkResults": {"overall": "PASS", "violations": [{"id": "W1"}]}
        }))
        .unwrap();

        assert_eq!(store.get("checkResults.overall"), Some(&json!("PASS")));
        assert_eq!(
            store.get("checkResults.violations.0.id"),
            Some(&json!("W1"))
        );
        assert_eq!(store.get("checkResults.missing"), None);
        assert_eq!(store.get("checkResults.overall.deeper"), None);
    }

    #[test]
    fn test_set_creates_intermediates() {
        let mut store = StateStore::new();
        store.set("checkResults.overall", json!("FAIL")).unwrap();
        store.set("checkResults.score", json!(70)).unwrap();

        assert_eq!(
            store.get("checkResults"),
            Some(&json!({"overall": "FAIL", "score": 70}))
        );
    }

    #[test]
    fn test_set_replaces_scalar_intermediate() {
        let mut store = StateStore::from_value(json!({"plotState": "draft"})).unwrap();
        store.set("plotState.arc", json!("rising")).unwrap();
        assert_eq!(store.get("plotState.arc"), Some(&json!("rising")));
    }

    #[test]
    fn test_apply_is_all_or_nothing() {
        let mut store = StateStore::from_value(json!({"draftContent": "v1"})).unwrap();
        let mut bad = Map::new();
        bad.insert("draftContent".to_string(), json!("v2"));
        bad.insert("not a key".to_string(), json!(1));

        assert!(store.apply(&bad).is_err());
        assert_eq!(store.get("draftContent"), Some(&json!("v1")));

        let mut good = Map::new();
        good.insert("draftContent".to_string(), json!("v2"));
        good.insert("extractedEvents".to_string(), json!({"events": []}));
        store.apply(&good).unwrap();
        assert_eq!(store.get("draftContent"), Some(&json!("v2")));
        assert!(store.get("extractedEvents").is_some());
    }

    #[test]
    fn test_from_value_rejects_non_object() {
        assert!(StateStore::from_value(json!([1, 2])).is_err());
        assert!(StateStore::from_value(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_presence_summary() {
        let store = StateStore::from_value(json!({"chapterPlan": {"beats": [1]}})).unwrap();
        let summary = store.presence_summary(["chapterPlan", "draftContent"]);
        assert!(summary.contains("- chapterPlan: present"));
        assert!(summary.contains("- draftContent: absent"));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut store = StateStore::new();
        store.set("chapterPlan.beats", json!(["arrival"])).unwrap();
        store.save(&path).await.unwrap();

        let loaded = StateStore::load(&path).await.unwrap();
        assert_eq!(loaded, store);
    }
}
