//! Rule Engine
//!
//! Evaluates the selected rules against a text. The preferred path embeds
//! the whole selection in one oracle call; when that call fails or its
//! answer cannot be read, every rule is evaluated on its own through the
//! routine for its scope (see [`super::scopes`]).

use serde_json::{json, Value};
use std::collections::HashMap;

use super::scopes;
use super::{Rule, RuleFilter, RuleSet, Violation};
use crate::context::{ExtractedEvents, NarrativeContext, WritingIntent};
use crate::llm::{LLMError, OracleClient};

/// Everything one evaluation sees
#[derive(Debug, Clone, Copy)]
pub struct EvaluationInput<'a> {
    pub text: &'a str,
    pub intent: Option<&'a WritingIntent>,
    pub context: &'a NarrativeContext,
    pub events: &'a ExtractedEvents,
}

impl<'a> EvaluationInput<'a> {
    pub fn new(text: &'a str, context: &'a NarrativeContext, events: &'a ExtractedEvents) -> Self {
        Self {
            text,
            intent: None,
            context,
            events,
        }
    }

    pub fn with_intent(mut self, intent: Option<&'a WritingIntent>) -> Self {
        self.intent = intent;
        self
    }
}

const BATCH_SYSTEM_PROMPT: &str = "You are a continuity editor checking a chapter against a rule catalogue.\n\
For every rule the text breaks, report one entry. Report nothing for rules that hold.\n\
Answer with ONLY a JSON object:\n\
{\"violations\": [{\"rule_id\": string, \"evidence\": string, \"location\": string, \"entities\": [string]}]}\n\
Use {\"violations\": []} when every rule holds.";

/// Declarative rule evaluator
#[derive(Debug, Clone)]
pub struct RuleEngine {
    oracle: OracleClient,
    rules: RuleSet,
    batched: bool,
}

impl RuleEngine {
    pub fn new(oracle: OracleClient, rules: RuleSet) -> Self {
        Self {
            oracle,
            rules,
            batched: true,
        }
    }

    /// Skip the batched call and evaluate rule by rule
    pub fn with_batched(mut self, batched: bool) -> Self {
        self.batched = batched;
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Evaluate the rules selected by `filter`.
    ///
    /// Never fails: a batched failure degrades to per-rule evaluation, and a
    /// per-rule failure drops only that rule.
    pub async fn evaluate(
        &self,
        input: &EvaluationInput<'_>,
        filter: &RuleFilter,
    ) -> Vec<Violation> {
        let selected = self.rules.select(filter);
        if selected.is_empty() {
            return Vec::new();
        }

        if self.batched {
            match self.evaluate_batched(&selected, input).await {
                Ok(violations) => {
                    tracing::debug!(
                        "Batched evaluation of {} rules found {} violations",
                        selected.len(),
                        violations.len()
                    );
                    return violations;
                }
                Err(e) => {
                    tracing::warn!("Batched rule evaluation failed, evaluating per rule: {}", e);
                }
            }
        }

        self.evaluate_each(&selected, input).await
    }

    /// One oracle call for the whole selection
    pub async fn evaluate_batched(
        &self,
        rules: &[&Rule],
        input: &EvaluationInput<'_>,
    ) -> Result<Vec<Violation>, LLMError> {
        let catalogue: Vec<Value> = rules
            .iter()
            .map(|r| {
                json!({
                    "id": r.id,
                    "scope": r.scope.as_str(),
                    "level": r.level.as_str(),
                    "assertion": r.assertion,
                    "message": r.message,
                    "suggestion": r.suggestion,
                })
            })
            .collect();

        let user = format!(
            "Rules:\n{}\n\nContext:\n{}\n\nText:\n{}",
            serde_json::to_string_pretty(&catalogue).unwrap_or_default(),
            serde_json::to_string_pretty(&batch_context(input)).unwrap_or_default(),
            input.text
        );

        let answer = self.oracle.ask_json(BATCH_SYSTEM_PROMPT, &user).await?;
        normalize_batch(&answer, rules)
    }

    /// Every rule on its own, failures skipped
    pub async fn evaluate_each(
        &self,
        rules: &[&Rule],
        input: &EvaluationInput<'_>,
    ) -> Vec<Violation> {
        let mut violations = Vec::new();
        for rule in rules {
            match scopes::evaluate_rule(&self.oracle, rule, input).await {
                Ok(Some(violation)) => violations.push(violation),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Skipping rule '{}': evaluation failed: {}", rule.id, e);
                }
            }
        }
        violations
    }
}

fn batch_context(input: &EvaluationInput<'_>) -> Value {
    json!({
        "worldRules": input.context.world_rules,
        "characters": input.context.characters,
        "plotState": input.context.plot_state,
        "foreshadows": input.context.foreshadows,
        "chapterHistory": input.context.chapter_history,
        "events": input.events.events,
        "stateTransitions": input.events.state_transitions,
        "intent": input.intent,
    })
}

/// Map a batched answer onto canonical violations.
///
/// Entries are matched to the evaluated rules by id; entries naming a rule
/// outside the selection are dropped. Severity, scope and message always
/// come from the rule itself.
fn normalize_batch(answer: &Value, rules: &[&Rule]) -> Result<Vec<Violation>, LLMError> {
    let entries = match answer {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("violations") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(LLMError::ParseError(
                    "answer has no violations array".to_string(),
                ))
            }
        },
        _ => {
            return Err(LLMError::ParseError(
                "answer is not a JSON object".to_string(),
            ))
        }
    };

    let by_id: HashMap<&str, &Rule> = rules.iter().map(|r| (r.id.as_str(), *r)).collect();
    let mut violations = Vec::new();
    for entry in entries {
        let Some(id) = entry
            .get("rule_id")
            .or_else(|| entry.get("id"))
            .and_then(Value::as_str)
        else {
            tracing::warn!("Dropping violation without rule id: {}", entry);
            continue;
        };
        let Some(rule) = by_id.get(id) else {
            tracing::warn!("Dropping violation for unknown rule '{}'", id);
            continue;
        };
        let (evidence, location, entities) = scopes::findings(entry);
        violations.push(rule.violation(evidence, location, entities));
    }
    Ok(violations)
}
