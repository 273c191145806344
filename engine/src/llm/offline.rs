//! Offline provider
//!
//! Always unavailable. Wiring it in place of a real provider makes every
//! oracle consultation fail, which drives the planner and the rule engine
//! down their deterministic fallback paths (`loom --offline`).

use async_trait::async_trait;

use super::{LLMError, LLMProvider, OracleReply, OracleRequest, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineProvider;

#[async_trait]
impl LLMProvider for OfflineProvider {
    fn name(&self) -> &str {
        "offline"
    }

    fn is_local(&self) -> bool {
        true
    }

    fn estimated_cost(&self, _tokens: usize) -> f64 {
        0.0
    }

    async fn generate(&self, _request: &OracleRequest) -> Result<OracleReply> {
        Err(LLMError::ProviderUnavailable(
            "offline mode: no oracle configured".to_string(),
        ))
    }

    async fn check_health(&self) -> bool {
        false
    }
}
