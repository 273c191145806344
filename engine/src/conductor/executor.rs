//! Conductor Executor
//!
//! Dispatches one skill invocation by name. The executor checks the skill's
//! declared input shape, enforces the per-skill timeout and converts panics
//! into ordinary failures, so a misbehaving skill never takes the task loop
//! down with it.

use futures::FutureExt;
use sdk::errors::EngineError;
use sdk::{Skill, SkillInput, SkillOptions, SkillOutput};
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::PlannerConfig;

/// Name-indexed set of skill implementations
#[derive(Default, Clone)]
pub struct SkillRegistry {
    skills: HashMap<String, Arc<dyn Skill>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a skill under its own name, replacing any previous entry
    pub fn register(&mut self, skill: Arc<dyn Skill>) {
        let name = skill.name().to_string();
        if self.skills.insert(name.clone(), skill).is_some() {
            warn!("Skill '{}' registered twice, keeping the latest", name);
        }
    }

    pub fn with(mut self, skill: Arc<dyn Skill>) -> Self {
        self.register(skill);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Skill>> {
        self.skills.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.skills.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.skills.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}

impl std::fmt::Debug for SkillRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkillRegistry")
            .field("skills", &self.names())
            .finish()
    }
}

/// Outcome of one invocation
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub skill: String,
    pub success: bool,
    pub output: Option<SkillOutput>,
    pub error: Option<String>,
    pub duration: Duration,
}

impl ExecutionResult {
    fn succeeded(skill: &str, output: SkillOutput, duration: Duration) -> Self {
        Self {
            skill: skill.to_string(),
            success: true,
            output: Some(output),
            error: None,
            duration,
        }
    }

    fn failed(skill: &str, error: impl ToString, duration: Duration) -> Self {
        Self {
            skill: skill.to_string(),
            success: false,
            output: None,
            error: Some(error.to_string()),
            duration,
        }
    }
}

pub struct Executor {
    registry: SkillRegistry,
    default_timeout: Duration,
    critical: HashSet<String>,
}

impl Executor {
    pub fn new(registry: SkillRegistry, default_timeout: Duration) -> Self {
        Self {
            registry,
            default_timeout,
            critical: HashSet::new(),
        }
    }

    pub fn from_config(registry: SkillRegistry, config: &PlannerConfig) -> Self {
        Self::new(registry, Duration::from_secs(config.skill_timeout_secs))
            .with_critical(config.critical_skills.iter().cloned())
    }

    /// Mark skills whose failure aborts the task
    pub fn with_critical<I>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.critical.extend(skills);
        self
    }

    pub fn registry(&self) -> &SkillRegistry {
        &self.registry
    }

    pub fn is_critical(&self, skill: &str) -> bool {
        self.critical.contains(skill)
    }

    /// Run one skill. Never returns `Err`: every failure mode lands in the
    /// result so the caller decides whether it is fatal.
    pub async fn execute(
        &self,
        skill_name: &str,
        input: SkillInput,
        options: &SkillOptions,
    ) -> ExecutionResult {
        let start = Instant::now();

        let Some(skill) = self.registry.get(skill_name) else {
            warn!("No implementation registered for skill '{}'", skill_name);
            return ExecutionResult::failed(
                skill_name,
                EngineError::UnknownSkill(skill_name.to_string()),
                start.elapsed(),
            );
        };

        if let Some(field) = skill
            .required_inputs()
            .iter()
            .find(|field| !input.has(field))
        {
            return ExecutionResult::failed(
                skill_name,
                EngineError::MissingInput {
                    skill: skill_name.to_string(),
                    field: field.to_string(),
                },
                start.elapsed(),
            );
        }

        let timeout = options
            .timeout
            .or_else(|| skill.timeout())
            .unwrap_or(self.default_timeout);
        debug!("Executing '{}' (timeout {:?})", skill_name, timeout);

        let run = AssertUnwindSafe(skill.run(input, options)).catch_unwind();
        let outcome = tokio::time::timeout(timeout, run).await;
        let duration = start.elapsed();

        match outcome {
            Ok(Ok(Ok(output))) => {
                info!(
                    "Skill '{}' succeeded in {:?}, wrote {:?}",
                    skill_name,
                    duration,
                    output.produced_keys().collect::<Vec<_>>()
                );
                ExecutionResult::succeeded(skill_name, output, duration)
            }
            Ok(Ok(Err(e))) => {
                warn!("Skill '{}' failed: {}", skill_name, e);
                ExecutionResult::failed(skill_name, e, duration)
            }
            Ok(Err(panic)) => {
                let reason = panic_message(panic.as_ref());
                warn!("Skill '{}' panicked: {}", skill_name, reason);
                ExecutionResult::failed(skill_name, format!("panicked: {}", reason), duration)
            }
            Err(_) => {
                warn!("Skill '{}' timed out after {:?}", skill_name, timeout);
                ExecutionResult::failed(
                    skill_name,
                    format!("timed out after {}s", timeout.as_secs_f32()),
                    duration,
                )
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
