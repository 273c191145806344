//! Surface text check
//!
//! A single oracle pass over viewpoint, formatting and local logic. Answers
//! in any other category are discarded.

use serde_json::Value;

use crate::llm::{LLMError, OracleClient};
use crate::rules::{Severity, Violation, ViolationKind};

const TEXT_SYSTEM_PROMPT: &str = "You proofread fiction for surface problems only:\n\
- pov: the viewpoint character or narrative person shifts without a scene break\n\
- format: broken dialogue punctuation, stray markup, inconsistent tense\n\
- logic: a sentence contradicts the one before it\n\
Answer with ONLY a JSON object:\n\
{\"issues\": [{\"type\": \"pov|format|logic\", \"severity\": \"error|warning|low\", \"message\": string, \"suggestion\": string, \"location\": string}]}";

#[derive(Debug, Clone)]
pub struct TextLayer {
    oracle: OracleClient,
}

impl TextLayer {
    pub fn new(oracle: OracleClient) -> Self {
        Self { oracle }
    }

    pub async fn check(&self, text: &str) -> Result<Vec<Violation>, LLMError> {
        let answer = self.oracle.ask_json(TEXT_SYSTEM_PROMPT, text).await?;
        Ok(parse_issues(&answer))
    }
}

fn parse_issues(answer: &Value) -> Vec<Violation> {
    let entries = answer
        .get("issues")
        .or_else(|| answer.get("violations"))
        .and_then(Value::as_array)
        .or_else(|| answer.as_array());
    let Some(entries) = entries else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let text = |field: &str| entry.get(field).and_then(Value::as_str);
            let kind = text("type")
                .or_else(|| text("kind"))
                .and_then(ViolationKind::from_label)
                .filter(|k| k.is_surface())?;
            let message = text("message")?.trim().to_string();
            let severity = text("severity")
                .and_then(Severity::from_label)
                .unwrap_or(Severity::Warn);
            let rule_id = match kind {
                ViolationKind::Pov => "text.pov",
                ViolationKind::Format => "text.format",
                _ => "text.logic",
            };

            Some(Violation {
                rule_id: rule_id.to_string(),
                kind,
                scope: None,
                severity,
                message,
                suggestion: text("suggestion").unwrap_or_default().to_string(),
                evidence: text("evidence").map(str::to_string),
                location: text("location").map(str::to_string),
                entities: Vec::new(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::scripted::ScriptedProvider;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_only_surface_categories_kept() {
        let answer = json!({"issues": [
            {"type": "pov", "severity": "major", "message": "switches to first person"},
            {"type": "character", "severity": "error", "message": "out of scope"},
            {"type": "format", "message": "missing quote"},
            {"type": "logic", "severity": "banana", "message": "door open and shut"}
        ]});
        let issues = parse_issues(&answer);
        assert_eq!(issues.len(), 3);
        assert_eq!(issues[0].severity, Severity::Error);
        assert_eq!(issues[0].rule_id, "text.pov");
        assert_eq!(issues[1].severity, Severity::Warn);
        assert_eq!(issues[2].kind, ViolationKind::Logic);
    }

    #[test]
    fn test_unexpected_shape_yields_nothing() {
        assert!(parse_issues(&json!({"ok": true})).is_empty());
        assert_eq!(
            parse_issues(&json!([{"type": "format", "message": "m"}])).len(),
            1
        );
    }

    #[tokio::test]
    async fn test_check_propagates_oracle_failure() {
        let layer = TextLayer::new(OracleClient::new(Arc::new(ScriptedProvider::new(|_| {
            Err(LLMError::Timeout)
        }))));
        assert!(layer.check("text").await.is_err());
    }
}
