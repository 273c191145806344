//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - run: drive a task to its goal state
//! - plan: show the next plan for a stored state
//! - check: run the consistency gate over a text
//! - skills: list the contract catalogue
//! - rules: list the merged rule catalogue

use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

use crate::app::Loom;
use crate::conductor::{CancellationFlag, IntentKind, TaskReport};
use crate::context::{
    ContextProvider, JsonContextProvider, NarrativeContext, StaticContextProvider, WritingIntent,
};
use crate::gate::{GateInput, GateReport};
use crate::rules::Scope;
use crate::state::StateStore;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

fn context_provider(path: Option<&Path>) -> Arc<dyn ContextProvider> {
    match path {
        Some(path) => Arc::new(JsonContextProvider::new(path)),
        None => Arc::new(StaticContextProvider::new(NarrativeContext::empty())),
    }
}

async fn load_store(path: Option<&Path>) -> Result<StateStore> {
    match path {
        Some(path) => StateStore::load(path)
            .await
            .with_context(|| format!("Failed to load state from {}", path.display())),
        None => Ok(StateStore::new()),
    }
}

/// Read a writing intent file, if one was given
pub async fn load_intent(path: Option<&Path>) -> Result<Option<WritingIntent>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let intent = serde_json::from_str::<WritingIntent>(&contents)
        .with_context(|| format!("Invalid intent file {}", path.display()))?;
    Ok(Some(intent))
}

/// Run a task to completion
///
/// Ctrl-C sets the cancellation flag; the runner stops before the next step
/// and the state so far can still be saved. An intent file replaces any
/// `writingIntent` already in the loaded state.
#[allow(clippy::too_many_arguments)]
pub async fn handle_run(
    loom: &Loom,
    request: String,
    intent: &str,
    context: Option<&Path>,
    intent_file: Option<&Path>,
    state: Option<&Path>,
    save: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let intent: IntentKind = intent.parse()?;
    let mut store = load_store(state).await?;
    if let Some(writing_intent) = load_intent(intent_file).await? {
        store.set("writingIntent", serde_json::to_value(&writing_intent)?)?;
    }

    let cancel = CancellationFlag::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current step");
            on_signal.cancel();
        }
    });

    let mut runner = loom.runner(context_provider(context));
    let report = runner.run(intent, &request, &mut store, &cancel).await;

    if let Some(path) = save {
        store
            .save(path)
            .await
            .with_context(|| format!("Failed to save state to {}", path.display()))?;
    }

    print_report(&report, &store, format)?;
    if report.success {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "task did not reach its goal: {}",
            report.error.as_deref().unwrap_or("unknown error")
        ))
    }
}

fn print_report(report: &TaskReport, store: &StateStore, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Text => {
            println!("Task {} ({})", report.task_id, report.intent);
            for step in &report.steps {
                let mark = if step.success { "✓" } else { "✗" };
                print!("  {} {:<18} {:>6}ms", mark, step.skill, step.duration_ms);
                match &step.error {
                    Some(e) => println!("  {}", e),
                    None => println!("  wrote {}", step.produced.join(", ")),
                }
            }
            println!();
            if let Some(check) = &report.check_snapshot {
                println!("Consistency: {}", check["overall"].as_str().unwrap_or("-"));
            }
            if report.success {
                println!("✓ Goal reached: {}", report.goal.join(", "));
                if let Some(content) = store.get("finalContent").and_then(|v| v.as_str()) {
                    println!();
                    println!("{}", content);
                }
            } else {
                println!(
                    "✗ Task failed: {}",
                    report.error.as_deref().unwrap_or("goal not reached")
                );
            }
        }
    }
    Ok(())
}

/// Show the next plan for a stored state
pub async fn handle_plan(
    loom: &Loom,
    intent: &str,
    state: Option<&Path>,
    request: &str,
    format: OutputFormat,
) -> Result<()> {
    let intent: IntentKind = intent.parse()?;
    let store = load_store(state).await?;
    let plan = loom
        .planner()
        .plan(intent, &store, request)
        .await
        .context("Planning failed")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
        OutputFormat::Text => {
            if plan.is_empty() {
                println!("Goal already satisfied for {}", intent);
            } else {
                println!("Next steps ({:?}):", plan.source);
                for (i, step) in plan.steps.iter().enumerate() {
                    println!("  {}. {} -> {}  {}", i + 1, step.skill, step.target, step.rationale);
                }
            }
        }
    }
    Ok(())
}

/// Run the gate over a text file
pub async fn handle_check(
    loom: &Loom,
    file: &Path,
    context: Option<&Path>,
    intent_file: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let context = context_provider(context).load().await?;

    let intent = load_intent(intent_file).await?;

    let input = GateInput::new(&text, &context).with_intent(intent.as_ref());
    let report = loom.gate().check(&input).await;
    print_gate(&report, format)
}

fn print_gate(report: &GateReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => {
            println!("{}", report.summary());
            for v in &report.violations {
                println!("  [{}] {} {}", v.severity.as_str(), v.rule_id, v.message);
                if let Some(evidence) = &v.evidence {
                    println!("         evidence: {}", evidence);
                }
                if !v.suggestion.is_empty() {
                    println!("         suggestion: {}", v.suggestion);
                }
            }
            for stage in report.degraded_stages() {
                println!("  ! stage {:?} failed; its rules were not applied", stage);
            }
        }
    }
    Ok(())
}

/// List the skill contract catalogue with its reachability check
pub fn handle_skills(loom: &Loom, format: OutputFormat) -> Result<()> {
    let contracts = loom.contracts();
    let intents: Vec<_> = IntentKind::ALL
        .iter()
        .map(|kind| {
            let goal = kind.goal();
            let unreachable = contracts.unreachable_keys(&goal);
            (kind, goal, unreachable)
        })
        .collect();

    match format {
        OutputFormat::Json => {
            let output = json!({
                "skills": contracts.iter().collect::<Vec<_>>(),
                "intents": intents
                    .iter()
                    .map(|(kind, goal, unreachable)| json!({
                        "intent": kind.as_str(),
                        "goal": goal,
                        "unreachable": unreachable,
                    }))
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            println!("Skills:");
            for c in contracts.iter() {
                println!("  {}", c.name);
                println!("    requires: {}", c.requires.join(", "));
                println!("    produces: {}", c.produces.join(", "));
                if !c.revises.is_empty() {
                    println!("    revises:  {}", c.revises.join(", "));
                }
            }
            println!();
            println!("Intents:");
            for (kind, goal, unreachable) in &intents {
                let status = if unreachable.is_empty() {
                    "reachable".to_string()
                } else {
                    format!("UNREACHABLE: {}", unreachable.join(", "))
                };
                println!("  {:<18} {:<24} {}", kind.as_str(), goal.join(", "), status);
            }
        }
    }
    Ok(())
}

/// List the merged rule catalogue
pub fn handle_rules(loom: &Loom, format: OutputFormat) -> Result<()> {
    let rules = loom.gate().engine().rules();
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&rules.iter().collect::<Vec<_>>())?
            );
        }
        OutputFormat::Text => {
            println!("{} rules", rules.len());
            for scope in Scope::ALL {
                println!("  {}: {}", scope.as_str(), rules.count_by_scope(scope));
            }
            println!();
            for rule in rules.iter() {
                println!(
                    "  {:<28} {:<9} {:<5} {}",
                    rule.id,
                    rule.scope.as_str(),
                    rule.level.as_str(),
                    rule.assertion
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::llm::scripted::ScriptedProvider;
    use crate::llm::{LLMError, OracleClient};

    #[tokio::test]
    async fn test_load_intent_reads_goals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intent.json");
        std::fs::write(&path, r#"{"goals": ["reveal the map"]}"#).unwrap();

        let intent = load_intent(Some(&path)).await.unwrap().unwrap();
        assert_eq!(intent.goals, vec!["reveal the map".to_string()]);
        assert!(intent.constraints.is_empty());

        assert!(load_intent(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_intent_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intent.json");
        std::fs::write(&path, r#"{"goals": "not a list"}"#).unwrap();

        let err = load_intent(Some(&path)).await.unwrap_err();
        assert!(err.to_string().starts_with("Invalid intent file"));
    }

    #[tokio::test]
    async fn test_run_stores_intent_file() {
        let dir = tempfile::tempdir().unwrap();
        let intent_path = dir.path().join("intent.json");
        let save_path = dir.path().join("state.json");
        std::fs::write(&intent_path, r#"{"goals": ["tension"], "constraints": ["no magic"]}"#)
            .unwrap();

        let oracle = OracleClient::new(Arc::new(ScriptedProvider::new(|_| Err(LLMError::Timeout))));
        let loom = Loom::new(Config::default_config(), oracle).unwrap();

        // The oracle never answers, so the task fails but its state is saved
        let result = handle_run(
            &loom,
            "chapter one".to_string(),
            "plan_chapter",
            None,
            Some(&intent_path),
            None,
            Some(&save_path),
            OutputFormat::Json,
        )
        .await;
        assert!(result.is_err());

        let store = StateStore::load(&save_path).await.unwrap();
        assert_eq!(
            store.get("writingIntent"),
            Some(&serde_json::json!({"goals": ["tension"], "constraints": ["no magic"]}))
        );
    }
}
