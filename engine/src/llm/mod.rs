//! Oracle Provider Abstraction Layer
//!
//! The planner, the rule engine and the oracle-backed skills all consult an
//! external language model ("the oracle"). This module defines the request
//! shape, the tagged reply every provider normalises into, and the
//! `LLMProvider` trait the router and the concrete providers implement.
//!
//! Callers never assume an answer is valid JSON: [`extract`] performs the
//! ordered direct / fenced / brace-scan extraction.

use async_trait::async_trait;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub mod client;
pub mod extract;
pub mod offline;
pub mod ollama;
pub mod openai;
pub mod router;
pub mod scripted;

pub use client::OracleClient;
pub use extract::{extract_json, Extraction};

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Oracle reported failure: {0}")]
    Rejected(String),
}

impl From<LLMError> for EngineError {
    fn from(error: LLMError) -> Self {
        match error {
            LLMError::Timeout => EngineError::OracleTimeout,
            LLMError::ParseError(msg) => EngineError::OracleParse(msg),
            other => EngineError::LLMProvider(other.to_string()),
        }
    }
}

/// One oracle consultation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl OracleRequest {
    /// Create a request with the default sampling settings
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.3,
            max_tokens: 2048,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// The request as a two-message chat transcript
    pub fn messages(&self) -> Vec<Message> {
        vec![Message::system(&self.system), Message::user(&self.user)]
    }
}

/// Answer from the oracle, normalised at the provider boundary.
///
/// Providers answer with plain text, with a `{success, response|error}`
/// envelope, or with an already-parsed JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OracleReply {
    /// Plain text
    Raw(RawText),

    /// `{success, response | error}` envelope
    Wrapped {
        success: bool,
        #[serde(default)]
        response: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },

    /// Already-structured JSON
    Structured(StructuredValue),
}

/// Newtype so `Raw` can live in an internally tagged enum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawText {
    pub text: String,
}

/// Newtype so `Structured` can live in an internally tagged enum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredValue {
    pub value: Value,
}

impl OracleReply {
    pub fn raw(text: impl Into<String>) -> Self {
        Self::Raw(RawText { text: text.into() })
    }

    pub fn structured(value: Value) -> Self {
        Self::Structured(StructuredValue { value })
    }

    pub fn wrapped_ok(response: impl Into<String>) -> Self {
        Self::Wrapped {
            success: true,
            response: Some(response.into()),
            error: None,
        }
    }

    pub fn wrapped_err(error: impl Into<String>) -> Self {
        Self::Wrapped {
            success: false,
            response: None,
            error: Some(error.into()),
        }
    }

    /// Classify an arbitrary JSON answer: an object with a boolean `success`
    /// field is an envelope, anything else is structured.
    pub fn from_value(value: Value) -> Self {
        if let Some(success) = value.get("success").and_then(Value::as_bool) {
            let text_of = |field: &str| {
                value.get(field).map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
            };
            return Self::Wrapped {
                success,
                response: text_of("response"),
                error: text_of("error"),
            };
        }
        Self::structured(value)
    }

    /// The answer as text. A failed envelope becomes `LLMError::Rejected`.
    pub fn into_text(self) -> Result<String> {
        match self {
            Self::Raw(RawText { text }) => Ok(text),
            Self::Wrapped {
                success: true,
                response,
                ..
            } => Ok(response.unwrap_or_default()),
            Self::Wrapped { error, .. } => Err(LLMError::Rejected(
                error.unwrap_or_else(|| "no error detail".to_string()),
            )),
            Self::Structured(StructuredValue { value }) => Ok(value.to_string()),
        }
    }

    /// The answer as JSON, running the three-stage extraction over text.
    pub fn into_value(self) -> Result<Value> {
        match self {
            Self::Structured(StructuredValue { value }) => Ok(value),
            other => {
                let text = other.into_text()?;
                match extract_json(&text) {
                    Extraction::NotFound => Err(LLMError::ParseError(format!(
                        "no JSON object in answer ({} chars)",
                        text.len()
                    ))),
                    found => Ok(found.into_value().unwrap_or(Value::Null)),
                }
            }
        }
    }
}

/// Message in a chat transcript
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender
    pub role: MessageRole,

    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// Oracle provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "ollama", "openai")
    fn name(&self) -> &str;

    /// Returns true if this is a local provider (e.g., Ollama)
    fn is_local(&self) -> bool;

    /// Returns the estimated cost in USD for the given token count.
    /// Local providers should return 0.0
    fn estimated_cost(&self, tokens: usize) -> f64;

    /// Consult the oracle
    async fn generate(&self, request: &OracleRequest) -> Result<OracleReply>;

    /// Check if the provider is currently healthy and available
    async fn check_health(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_builder() {
        let request = OracleRequest::new("sys", "user")
            .with_temperature(0.1)
            .with_max_tokens(512);
        assert_eq!(request.temperature, 0.1);
        assert_eq!(request.max_tokens, 512);

        let messages = request.messages();
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(messages[1].content, "user");
    }

    #[test]
    fn test_reply_from_value_detects_envelope() {
        let wrapped = OracleReply::from_value(json!({"success": true, "response": "ok"}));
        assert_eq!(wrapped, OracleReply::wrapped_ok("ok"));

        let failed = OracleReply::from_value(json!({"success": false, "error": "quota"}));
        assert!(matches!(
            failed.into_text(),
            Err(LLMError::Rejected(msg)) if msg == "quota"
        ));

        let structured = OracleReply::from_value(json!({"steps": []}));
        assert!(matches!(structured, OracleReply::Structured(_)));
    }

    #[test]
    fn test_into_value_from_each_shape() {
        let raw = OracleReply::raw("Sure:\n```json\n{\"a\": 1}\n```");
        assert_eq!(raw.into_value().unwrap(), json!({"a": 1}));

        let wrapped = OracleReply::wrapped_ok(r#"{"b": 2}"#);
        assert_eq!(wrapped.into_value().unwrap(), json!({"b": 2}));

        let structured = OracleReply::structured(json!([1, 2]));
        assert_eq!(structured.into_value().unwrap(), json!([1, 2]));

        let prose = OracleReply::raw("no json here");
        assert!(matches!(prose.into_value(), Err(LLMError::ParseError(_))));
    }

    #[test]
    fn test_error_conversion() {
        let timeout: EngineError = LLMError::Timeout.into();
        assert!(matches!(timeout, EngineError::OracleTimeout));

        let parse: EngineError = LLMError::ParseError("bad".into()).into();
        assert!(matches!(parse, EngineError::OracleParse(_)));

        let other: EngineError = LLMError::RateLimitExceeded.into();
        assert!(matches!(other, EngineError::LLMProvider(_)));
    }

    #[test]
    fn test_reply_serialization_is_tagged() {
        let json = serde_json::to_string(&OracleReply::raw("x")).unwrap();
        assert!(json.contains(r#""type":"raw""#));
    }
}
