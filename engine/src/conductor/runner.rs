//! Task runner
//!
//! Drives one task: plan, execute the first step, apply its state updates,
//! replan. The loop ends when the goal holds, when planning fails, when a
//! critical skill fails, on cancellation, or at the iteration limit. Every
//! ending produces a `TaskReport`; errors are data here, not early returns.

use chrono::{DateTime, Utc};
use sdk::errors::EngineError;
use sdk::{SkillInput, SkillOptions};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::executor::Executor;
use super::intent::IntentKind;
use super::planner::Planner;
use super::types::PlanSource;
use crate::context::NarrativeContext;
use crate::state::{goal_satisfied, StateStore};

/// Cooperative cancellation, checked between steps
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One executed step
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub iteration: usize,
    pub skill: String,
    pub source: PlanSource,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub produced: Vec<String>,
    pub duration_ms: u64,
}

/// Outcome of one task
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task_id: String,
    pub intent: IntentKind,
    pub goal: Vec<String>,
    pub goal_reached: bool,
    pub success: bool,
    pub steps: Vec<StepRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Latest `checkResults`, even when the task failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_snapshot: Option<Value>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TaskReport {
    pub fn skills_run(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.skill.as_str()).collect()
    }
}

pub struct TaskRunner {
    planner: Planner,
    executor: Executor,
    max_iterations: usize,
}

impl TaskRunner {
    pub fn new(planner: Planner, executor: Executor, max_iterations: usize) -> Self {
        Self {
            planner,
            executor,
            max_iterations,
        }
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub async fn run(
        &mut self,
        intent: IntentKind,
        request: &str,
        store: &mut StateStore,
        cancel: &CancellationFlag,
    ) -> TaskReport {
        let task_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let goal = intent.goal();

        info!("Starting task {} ({}): {}", task_id, intent, request);
        self.planner.reset();

        let mut steps = Vec::new();
        let error = self
            .drive(&task_id, intent, request, store, cancel, &mut steps)
            .await
            .err();

        let goal_reached = goal_satisfied(&goal, store);
        let success = goal_reached && error.is_none();
        match &error {
            None => info!("Task {} finished after {} steps", task_id, steps.len()),
            Some(e) => warn!("Task {} ended with error: {}", task_id, e),
        }

        TaskReport {
            task_id,
            intent,
            goal,
            goal_reached,
            success,
            steps,
            error: error.map(|e| e.to_string()),
            check_snapshot: store.get("checkResults").cloned(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn drive(
        &mut self,
        task_id: &str,
        intent: IntentKind,
        request: &str,
        store: &mut StateStore,
        cancel: &CancellationFlag,
        steps: &mut Vec<StepRecord>,
    ) -> Result<(), EngineError> {
        let options = SkillOptions::for_task(task_id);

        for iteration in 1..=self.max_iterations {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let plan = self.planner.plan(intent, store, request).await?;
            let Some(step) = plan.first().cloned() else {
                debug!("Goal reached at iteration {}", iteration);
                return Ok(());
            };

            debug!(
                "Iteration {}/{}: running '{}' ({:?})",
                iteration, self.max_iterations, step.skill, plan.source
            );
            let input = self.build_input(&step.skill, intent, request, store);
            let result = self.executor.execute(&step.skill, input, &options).await;

            let mut success = result.success;
            let mut error = result.error;
            let mut produced = Vec::new();
            if let Some(output) = result.output {
                if let Some(contract) = self.planner.contracts().get(&step.skill) {
                    for key in output.produced_keys().filter(|k| !contract.writes_key(k)) {
                        warn!("'{}' wrote undeclared state key '{}'", step.skill, key);
                    }
                }
                match store.apply(&output.state_updates) {
                    Ok(()) => produced = output.produced_keys().map(str::to_string).collect(),
                    Err(e) => {
                        warn!("Discarding output of '{}': {}", step.skill, e);
                        success = false;
                        error = Some(e.to_string());
                    }
                }
            }
            self.planner.record_outcome(&step.skill, success);

            steps.push(StepRecord {
                iteration,
                skill: step.skill.clone(),
                source: plan.source,
                success,
                error: error.clone(),
                produced,
                duration_ms: result.duration.as_millis() as u64,
            });

            if !success && self.executor.is_critical(&step.skill) {
                return Err(EngineError::CriticalSkillFailed {
                    skill: step.skill,
                    reason: error.unwrap_or_default(),
                });
            }
        }

        if goal_satisfied(&intent.goal(), store) {
            Ok(())
        } else {
            Err(EngineError::IterationLimit(self.max_iterations))
        }
    }

    /// Input for one invocation: every required key (dotted keys also pass
    /// their root object), the request, the intent and the loaded context.
    fn build_input(
        &self,
        skill: &str,
        intent: IntentKind,
        request: &str,
        store: &StateStore,
    ) -> SkillInput {
        let mut input = SkillInput::new()
            .with_param("request", json!(request))
            .with_param("intent", json!(intent.as_str()));

        if let Some(contract) = self.planner.contracts().get(skill) {
            for key in &contract.requires {
                input.insert(key.clone(), store.get_or_null(key));
                if let Some((root, _)) = key.split_once('.') {
                    if !input.has(root) {
                        input.insert(root, store.get_or_null(root));
                    }
                }
            }
        }

        let context = NarrativeContext::from_store(store);
        input.insert("context", serde_json::to_value(&context).unwrap_or_default());
        if let Some(writing_intent) = store.get("writingIntent") {
            input.insert("writingIntent", writing_intent.clone());
        }
        input
    }
}
