//! Per-scope rule evaluation
//!
//! Used when the batched call is unavailable. Each scope has its own routine
//! that decides what part of the context the oracle sees for one rule, so a
//! CHARACTER rule is judged against the roster and state transitions only and
//! a HISTORY rule against prior chapters only.

use serde_json::{json, Value};

use super::{Rule, Scope, Violation};
use crate::llm::{LLMError, OracleClient};
use crate::rules::engine::EvaluationInput;

const RULE_SYSTEM_PROMPT: &str = "You check a piece of fiction against exactly one rule.\n\
Answer with ONLY a JSON object:\n\
{\"violated\": bool, \"reason\": string, \"evidence\": string, \"location\": string, \"entities\": [string]}";

/// What one scope routine shows the oracle
struct Projection {
    focus: &'static str,
    context: Value,
}

fn world_routine(rule: &Rule, input: &EvaluationInput<'_>) -> Projection {
    let mut context = json!({
        "worldRules": input.context.world_rules,
        "plotState": input.context.plot_state,
    });
    if rule.subtype.as_deref() == Some("state") {
        context["events"] = json!(input.events.events);
        context["stateTransitions"] = json!(input.events.state_transitions);
    }
    Projection {
        focus: "Judge only against the established world rules and world state.",
        context,
    }
}

fn character_routine(_rule: &Rule, input: &EvaluationInput<'_>) -> Projection {
    Projection {
        focus: "Judge only the characters: their roster entries and the state changes the text implies.",
        context: json!({
            "characters": input.context.characters,
            "stateTransitions": input.events.state_transitions,
        }),
    }
}

fn history_routine(_rule: &Rule, input: &EvaluationInput<'_>) -> Projection {
    Projection {
        focus: "Judge only against what earlier chapters established.",
        context: json!({
            "chapterHistory": input.context.chapter_history,
            "foreshadows": input.context.foreshadows,
        }),
    }
}

fn intent_routine(_rule: &Rule, input: &EvaluationInput<'_>) -> Projection {
    Projection {
        focus: "Judge whether the text delivers the stated goals and respects the stated constraints.",
        context: json!({ "intent": input.intent }),
    }
}

fn arc_routine(_rule: &Rule, input: &EvaluationInput<'_>) -> Projection {
    Projection {
        focus: "Judge whether the story state actually advances.",
        context: json!({
            "plotState": input.context.plot_state,
            "chapterHistory": input.context.chapter_history,
            "events": input.events.events,
        }),
    }
}

fn project(rule: &Rule, input: &EvaluationInput<'_>) -> Projection {
    match rule.scope {
        Scope::World => world_routine(rule, input),
        Scope::Character => character_routine(rule, input),
        Scope::History => history_routine(rule, input),
        Scope::Intent => intent_routine(rule, input),
        Scope::Arc => arc_routine(rule, input),
    }
}

/// Evaluate one rule with its own oracle call.
///
/// `Ok(None)` means the rule holds.
pub async fn evaluate_rule(
    oracle: &OracleClient,
    rule: &Rule,
    input: &EvaluationInput<'_>,
) -> Result<Option<Violation>, LLMError> {
    let projection = project(rule, input);
    let user = format!(
        "{}\n\nRule ({} / {}): {}\n\nContext:\n{}\n\nText:\n{}",
        projection.focus,
        rule.scope,
        rule.level,
        rule.assertion,
        serde_json::to_string_pretty(&projection.context).unwrap_or_default(),
        input.text
    );

    let answer = oracle.ask_json(RULE_SYSTEM_PROMPT, &user).await?;
    let violated = match answer.get("violated") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => {
            return Err(LLMError::ParseError(format!(
                "rule '{}': answer has no 'violated' field",
                rule.id
            )))
        }
    };

    if !violated {
        return Ok(None);
    }
    let (evidence, location, entities) = findings(&answer);
    Ok(Some(rule.violation(evidence, location, entities)))
}

/// Evidence, location and entity refs of one answer entry.
///
/// `evidence` falls back to `reason`.
pub(crate) fn findings(entry: &Value) -> (Option<String>, Option<String>, Vec<String>) {
    let text = |field: &str| entry.get(field).and_then(Value::as_str).map(str::to_string);
    let evidence = text("evidence")
        .filter(|e| !e.trim().is_empty())
        .or_else(|| text("reason"));
    let entities = entry
        .get("entities")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    (evidence, text("location"), entities)
}
