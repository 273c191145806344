//! Oracle client
//!
//! Thin wrapper that pairs a provider with the configured sampling settings
//! and normalises answers to text or JSON. Every component that consults the
//! oracle goes through this type.

use serde_json::Value;
use std::sync::Arc;

use super::{LLMProvider, OracleRequest, Result};
use crate::config::LLMConfig;

#[derive(Clone)]
pub struct OracleClient {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: u32,
}

impl OracleClient {
    /// Client using the default `[llm]` sampling settings
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self::from_config(provider, &LLMConfig::default())
    }

    /// Client using the sampling settings from `[llm]`
    pub fn from_config(provider: Arc<dyn LLMProvider>, config: &LLMConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    fn request(&self, system: &str, user: &str) -> OracleRequest {
        OracleRequest::new(system, user)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
    }

    /// Consult the oracle and return its answer as text
    pub async fn ask_text(&self, system: &str, user: &str) -> Result<String> {
        let reply = self.provider.generate(&self.request(system, user)).await?;
        reply.into_text()
    }

    /// Consult the oracle and extract a JSON document from its answer
    pub async fn ask_json(&self, system: &str, user: &str) -> Result<Value> {
        let reply = self.provider.generate(&self.request(system, user)).await?;
        reply.into_value()
    }
}

impl std::fmt::Debug for OracleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleClient")
            .field("provider", &self.provider.name())
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::scripted::ScriptedProvider;
    use crate::llm::LLMError;
    use serde_json::json;

    #[tokio::test]
    async fn test_ask_json_applies_settings() {
        let provider = ScriptedProvider::always("```json\n{\"ok\": true}\n```");
        let config = LLMConfig {
            temperature: 0.9,
            max_tokens: 99,
            ..LLMConfig::default()
        };
        let client = OracleClient::from_config(Arc::new(provider.clone()), &config);

        let value = client.ask_json("sys", "user").await.unwrap();
        assert_eq!(value, json!({"ok": true}));

        let seen = provider.requests();
        assert_eq!(seen[0].temperature, 0.9);
        assert_eq!(seen[0].max_tokens, 99);
    }

    #[tokio::test]
    async fn test_new_uses_config_defaults() {
        let provider = ScriptedProvider::always("fine");
        let client = OracleClient::new(Arc::new(provider.clone()));
        client.ask_text("sys", "user").await.unwrap();

        let defaults = LLMConfig::default();
        let seen = provider.requests();
        assert_eq!(seen[0].temperature, defaults.temperature);
        assert_eq!(seen[0].max_tokens, defaults.max_tokens);
    }

    #[tokio::test]
    async fn test_ask_json_rejects_prose() {
        let client = OracleClient::new(Arc::new(ScriptedProvider::always("I cannot help")));
        let result = client.ask_json("sys", "user").await;
        assert!(matches!(result, Err(LLMError::ParseError(_))));
    }
}
