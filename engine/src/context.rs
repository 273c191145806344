//! Narrative context collaborators
//!
//! Read-only inputs to planning and rule evaluation: the narrative memory
//! (world rules, roster, plot state, foreshadows, prior chapters), the event
//! extractor the state layer depends on, and the writing intent the contract
//! layer checks against.

use async_trait::async_trait;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

use crate::llm::OracleClient;
use crate::state::StateStore;

/// Narrative memory loaded for one task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NarrativeContext {
    pub world_rules: Value,
    pub characters: Value,
    pub plot_state: Value,
    pub foreshadows: Value,
    pub chapter_history: Value,
}

impl NarrativeContext {
    /// Context with every field loaded but empty
    pub fn empty() -> Self {
        Self {
            world_rules: json!([]),
            characters: json!([]),
            plot_state: json!({}),
            foreshadows: json!([]),
            chapter_history: json!([]),
        }
    }

    /// Read whatever context keys the store already holds
    pub fn from_store(store: &StateStore) -> Self {
        Self {
            world_rules: store.get_or_null("worldRules"),
            characters: store.get_or_null("characters"),
            plot_state: store.get_or_null("plotState"),
            foreshadows: store.get_or_null("foreshadows"),
            chapter_history: store.get_or_null("chapterHistory"),
        }
    }

    /// Store updates that load this context. Absent fields are loaded as
    /// empty containers so the allow-empty keys count as present.
    pub fn to_state_updates(&self) -> Map<String, Value> {
        let or_empty = |value: &Value, empty: Value| {
            if value.is_null() {
                empty
            } else {
                value.clone()
            }
        };
        let mut updates = Map::new();
        updates.insert("worldRules".into(), or_empty(&self.world_rules, json!([])));
        updates.insert("characters".into(), or_empty(&self.characters, json!([])));
        updates.insert("plotState".into(), or_empty(&self.plot_state, json!({})));
        updates.insert("foreshadows".into(), or_empty(&self.foreshadows, json!([])));
        updates.insert(
            "chapterHistory".into(),
            or_empty(&self.chapter_history, json!([])),
        );
        updates
    }
}

/// Source of narrative context
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn load(&self) -> Result<NarrativeContext, EngineError>;
}

/// Reads a JSON document shaped like [`NarrativeContext`]
pub struct JsonContextProvider {
    path: PathBuf,
}

impl JsonContextProvider {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl ContextProvider for JsonContextProvider {
    async fn load(&self) -> Result<NarrativeContext, EngineError> {
        let contents = tokio::fs::read_to_string(&self.path).await?;
        let context: NarrativeContext = serde_json::from_str(&contents)?;
        tracing::debug!("Loaded narrative context from {}", self.path.display());
        Ok(context)
    }
}

/// Holds a fixed context in memory
#[derive(Debug, Clone, Default)]
pub struct StaticContextProvider {
    context: NarrativeContext,
}

impl StaticContextProvider {
    pub fn new(context: NarrativeContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl ContextProvider for StaticContextProvider {
    async fn load(&self) -> Result<NarrativeContext, EngineError> {
        Ok(self.context.clone())
    }
}

/// Events and character state transitions extracted from a text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEvents {
    #[serde(default)]
    pub events: Vec<Value>,
    #[serde(default, alias = "stateTransitions")]
    pub state_transitions: Vec<Value>,
}

impl ExtractedEvents {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.state_transitions.is_empty()
    }

    /// Lenient conversion: missing or malformed lists become empty
    pub fn from_value(value: &Value) -> Self {
        let list = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| value.get(*name).and_then(Value::as_array))
                .cloned()
                .unwrap_or_default()
        };
        Self {
            events: list(&["events"]),
            state_transitions: list(&["state_transitions", "stateTransitions"]),
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "events": self.events,
            "state_transitions": self.state_transitions,
        })
    }
}

/// Extracts events from a text for the state layer
#[async_trait]
pub trait EventExtractor: Send + Sync {
    async fn extract(
        &self,
        text: &str,
        context: &NarrativeContext,
    ) -> Result<ExtractedEvents, EngineError>;
}

const EXTRACT_SYSTEM_PROMPT: &str = "You extract plot events and character state changes from fiction.\n\
Answer with ONLY a JSON object:\n\
{\"events\": [{\"summary\": string, \"characters\": [string]}],\n \
\"state_transitions\": [{\"character\": string, \"attribute\": string, \"from\": string, \"to\": string}]}\n\
Use empty arrays when nothing applies.";

/// Event extractor backed by the oracle
#[derive(Debug, Clone)]
pub struct OracleEventExtractor {
    oracle: OracleClient,
}

impl OracleEventExtractor {
    pub fn new(oracle: OracleClient) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl EventExtractor for OracleEventExtractor {
    async fn extract(
        &self,
        text: &str,
        context: &NarrativeContext,
    ) -> Result<ExtractedEvents, EngineError> {
        let user = format!(
            "Known characters:\n{}\n\nText:\n{}",
            context.characters, text
        );
        let value = self.oracle.ask_json(EXTRACT_SYSTEM_PROMPT, &user).await?;
        Ok(ExtractedEvents::from_value(&value))
    }
}

/// What the chapter is supposed to achieve
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WritingIntent {
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
}

impl WritingIntent {
    pub fn new(goals: Vec<String>, constraints: Vec<String>) -> Self {
        Self { goals, constraints }
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty() && self.constraints.is_empty()
    }

    /// Read an intent object from the store value, if one is there
    pub fn from_value(value: &Value) -> Option<Self> {
        if value.is_null() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}
