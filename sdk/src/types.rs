//! Skill input/output types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Input to a skill invocation
///
/// Parameters are keyed by name. The task runner fills one parameter per
/// state key the skill's contract requires (keyed by the full dotted key),
/// plus `request` and `intent`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillInput {
    pub params: Map<String, Value>,
}

impl SkillInput {
    /// Create an empty SkillInput
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Insert a parameter in place
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.params.insert(key.into(), value);
    }

    /// True if the parameter exists and is not null
    pub fn has(&self, key: &str) -> bool {
        self.params.get(key).is_some_and(|v| !v.is_null())
    }

    /// Get a string parameter
    pub fn param_str(&self, key: &str) -> Result<&str, InputError> {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| InputError::MissingParameter(key.to_string()))
    }

    /// Get an optional string parameter
    pub fn param_str_opt(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    /// Get a parameter as a JSON value
    pub fn param_json(&self, key: &str) -> Result<&Value, InputError> {
        self.params
            .get(key)
            .filter(|v| !v.is_null())
            .ok_or_else(|| InputError::MissingParameter(key.to_string()))
    }

    /// Get a parameter as a JSON value, `Null` when absent
    pub fn param_or_null(&self, key: &str) -> Value {
        self.params.get(key).cloned().unwrap_or(Value::Null)
    }
}

/// Output of a successful skill invocation
///
/// `state_updates` maps dotted state keys to the values the skill produced.
/// The runner applies all of them in one step, so a cancelled or failed
/// task never holds a half-applied skill result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillOutput {
    pub state_updates: Map<String, Value>,

    /// Optional human-readable note for logs and reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl SkillOutput {
    /// Create an output with no updates
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a produced state value
    pub fn with_update(mut self, key: impl Into<String>, value: Value) -> Self {
        self.state_updates.insert(key.into(), value);
        self
    }

    /// Attach a summary line
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Keys this output writes
    pub fn produced_keys(&self) -> impl Iterator<Item = &str> {
        self.state_updates.keys().map(String::as_str)
    }
}

/// Input shape errors
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_input_accessors() {
        let input = SkillInput::new()
            .with_param("request", json!("write chapter three"))
            .with_param("chapterPlan", json!({"beats": ["arrival"]}))
            .with_param("empty", Value::Null);

        assert_eq!(input.param_str("request").unwrap(), "write chapter three");
        assert!(input.param_json("chapterPlan").is_ok());
        assert!(input.has("chapterPlan"));
        assert!(!input.has("empty"));
        assert!(input.param_json("empty").is_err());
        assert!(input.param_str("missing").is_err());
        assert_eq!(input.param_or_null("missing"), Value::Null);
    }

    #[test]
    fn test_output_builder() {
        let output = SkillOutput::empty()
            .with_update("draftContent", json!("It was raining."))
            .with_summary("drafted 1 paragraph");

        let keys: Vec<&str> = output.produced_keys().collect();
        assert_eq!(keys, vec!["draftContent"]);
        assert_eq!(output.summary.as_deref(), Some("drafted 1 paragraph"));
    }
}
