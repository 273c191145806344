//! Oracle Router
//!
//! Ranks the configured providers and consults them in order, each call
//! bounded by the configured timeout. The router is itself an
//! `LLMProvider`, so the planner and the rule engine never know whether they
//! talk to one model or a failover chain.
//!
//! Failures are not retried on the same provider; a failed or timed-out
//! consultation moves on to the next provider, and when all fail the caller
//! takes its own fallback path.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{LLMError, LLMProvider, OracleReply, OracleRequest};
use crate::config::LLMConfig;

/// Oracle router with ordered failover
pub struct LLMRouter {
    /// Available providers
    providers: Vec<Box<dyn LLMProvider>>,

    /// LLM configuration
    config: Arc<LLMConfig>,
}

impl LLMRouter {
    /// Create a new router
    pub fn new(providers: Vec<Box<dyn LLMProvider>>, config: Arc<LLMConfig>) -> Self {
        Self { providers, config }
    }

    /// Number of registered providers
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Rank providers for a request
    ///
    /// 1. The configured default provider first
    /// 2. Local providers before cloud providers
    /// 3. Cheaper before more expensive
    ///
    /// The sort is stable, so registration order breaks remaining ties.
    pub fn rank_providers(&self, request: &OracleRequest) -> Vec<&dyn LLMProvider> {
        let estimated_tokens = (request.system.len() + request.user.len()) / 4;
        let default_provider = self.config.default_provider.as_str();

        let mut providers: Vec<&dyn LLMProvider> =
            self.providers.iter().map(|b| b.as_ref()).collect();

        providers.sort_by(|a, b| {
            let rank = |p: &dyn LLMProvider| (p.name() != default_provider, !p.is_local());
            rank(*a).cmp(&rank(*b)).then_with(|| {
                a.estimated_cost(estimated_tokens)
                    .partial_cmp(&b.estimated_cost(estimated_tokens))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });

        providers
    }

    /// Consult providers with automatic failover
    ///
    /// Returns the reply and the name of the provider that produced it.
    pub async fn call(&self, request: &OracleRequest) -> super::Result<(OracleReply, String)> {
        if self.providers.is_empty() {
            return Err(LLMError::ProviderUnavailable(
                "No LLM providers configured".to_string(),
            ));
        }

        let timeout = self.timeout();
        for provider in self.rank_providers(request) {
            tracing::debug!(
                "Attempting provider: {} (timeout: {}s)",
                provider.name(),
                timeout.as_secs()
            );

            match tokio::time::timeout(timeout, provider.generate(request)).await {
                Ok(Ok(OracleReply::Wrapped {
                    success: false,
                    error,
                    ..
                })) => {
                    tracing::warn!(
                        "Provider {} reported failure: {}",
                        provider.name(),
                        error.unwrap_or_default()
                    );
                }
                Ok(Ok(reply)) => {
                    tracing::debug!("Provider {} succeeded", provider.name());
                    return Ok((reply, provider.name().to_string()));
                }
                Ok(Err(e)) => {
                    tracing::warn!("Provider {} failed: {}", provider.name(), e);
                }
                Err(_) => {
                    tracing::warn!(
                        "Provider {} timed out after {}s",
                        provider.name(),
                        timeout.as_secs()
                    );
                }
            }
        }

        tracing::error!("All LLM providers exhausted");
        Err(LLMError::ProviderUnavailable(
            "All LLM providers failed".to_string(),
        ))
    }

    /// Check the health of all registered providers
    pub async fn check_health_all(&self) -> Vec<(&str, bool)> {
        let mut results = Vec::new();
        for provider in &self.providers {
            let is_healthy = provider.check_health().await;
            results.push((provider.name(), is_healthy));
        }
        results
    }
}

#[async_trait]
impl LLMProvider for LLMRouter {
    fn name(&self) -> &str {
        "router"
    }

    fn is_local(&self) -> bool {
        self.providers.iter().all(|p| p.is_local())
    }

    fn estimated_cost(&self, tokens: usize) -> f64 {
        self.providers
            .iter()
            .map(|p| p.estimated_cost(tokens))
            .reduce(f64::min)
            .unwrap_or(0.0)
    }

    async fn generate(&self, request: &OracleRequest) -> super::Result<OracleReply> {
        self.call(request).await.map(|(reply, _)| reply)
    }

    async fn check_health(&self) -> bool {
        for provider in &self.providers {
            if provider.check_health().await {
                return true;
            }
        }
        false
    }
}
