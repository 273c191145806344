use super::{LLMError, LLMProvider, OracleReply, OracleRequest};
use crate::config::OpenAIConfig;
use async_trait::async_trait;
use serde_json::json;

/// Environment variable holding the OpenAI API key
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

pub struct OpenAIProvider {
    config: OpenAIConfig,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig, api_key: Option<String>) -> Self {
        Self {
            config,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// Provider with the key taken from `OPENAI_API_KEY`
    pub fn from_env(config: OpenAIConfig) -> Self {
        let key = std::env::var(OPENAI_API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self::new(config, key)
    }

    pub fn has_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn is_local(&self) -> bool {
        false
    }

    fn estimated_cost(&self, tokens: usize) -> f64 {
        // Approx $0.002 per 1k tokens for gpt-4o-mini
        (tokens as f64 / 1000.0) * 0.002
    }

    async fn check_health(&self) -> bool {
        self.has_key()
    }

    async fn generate(&self, request: &OracleRequest) -> super::Result<OracleReply> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            LLMError::AuthenticationFailed(format!("{} is not set", OPENAI_API_KEY_ENV))
        })?;

        let url = format!("{}/chat/completions", self.config.base_url);

        let api_messages: Vec<_> = request
            .messages()
            .iter()
            .map(|msg| {
                json!({
                    "role": msg.role.to_string(),
                    "content": msg.content
                })
            })
            .collect();

        let payload = json!({
            "model": self.config.model,
            "messages": api_messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LLMError::Timeout
                } else {
                    LLMError::NetworkError(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(LLMError::AuthenticationFailed(text));
            } else if status.as_u16() == 429 {
                return Err(LLMError::RateLimitExceeded);
            } else {
                return Err(LLMError::InvalidRequest(text));
            }
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        let choice = data
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| LLMError::ParseError("No choices in response".to_string()))?;

        let content = choice
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| LLMError::ParseError("Empty content".to_string()))?;

        Ok(OracleReply::raw(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let provider = OpenAIProvider::new(OpenAIConfig::default(), None);
        assert!(!provider.check_health().await);

        let result = provider.generate(&OracleRequest::new("s", "u")).await;
        assert!(matches!(result, Err(LLMError::AuthenticationFailed(_))));
    }

    #[test]
    fn test_cost_scales_with_tokens() {
        let provider = OpenAIProvider::new(OpenAIConfig::default(), Some("k".into()));
        assert!(provider.estimated_cost(2000) > provider.estimated_cost(1000));
        assert!(!provider.is_local());
    }
}
