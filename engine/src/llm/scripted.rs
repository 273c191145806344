//! Scripted provider
//!
//! Answers every request with a caller-supplied closure and records the
//! requests it saw. Used for deterministic runs and throughout the tests to
//! stub oracle answers.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::{LLMProvider, OracleReply, OracleRequest, Result};

type Responder = dyn Fn(&OracleRequest) -> Result<OracleReply> + Send + Sync;

/// Closure-driven provider
#[derive(Clone)]
pub struct ScriptedProvider {
    responder: Arc<Responder>,
    calls: Arc<Mutex<Vec<OracleRequest>>>,
}

impl ScriptedProvider {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&OracleRequest) -> Result<OracleReply> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Provider answering every request with the same text
    pub fn always(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_| Ok(OracleReply::raw(text.clone())))
    }

    /// Number of requests answered so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }

    /// Copies of the requests answered so far
    pub fn requests(&self) -> Vec<OracleRequest> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn is_local(&self) -> bool {
        true
    }

    fn estimated_cost(&self, _tokens: usize) -> f64 {
        0.0
    }

    async fn generate(&self, request: &OracleRequest) -> Result<OracleReply> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }
        (self.responder)(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LLMError;

    #[tokio::test]
    async fn test_records_calls() {
        let provider = ScriptedProvider::always("hello");
        let reply = provider
            .generate(&OracleRequest::new("s", "first"))
            .await
            .unwrap();
        assert_eq!(reply, OracleReply::raw("hello"));
        assert_eq!(provider.call_count(), 1);
        assert_eq!(provider.requests()[0].user, "first");
    }

    #[tokio::test]
    async fn test_closure_sees_request() {
        let provider = ScriptedProvider::new(|req| {
            if req.user.contains("fail") {
                Err(LLMError::Timeout)
            } else {
                Ok(OracleReply::raw("ok"))
            }
        });
        assert!(provider.generate(&OracleRequest::new("", "fail")).await.is_err());
        assert!(provider.generate(&OracleRequest::new("", "pass")).await.is_ok());
    }
}
