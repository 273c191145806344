//! Skill trait
//!
//! A skill is a unit of work the task runner can dispatch. The engine knows
//! each skill only through its declared state contract and its input shape;
//! what the skill does inside `run` is opaque to the planner.

use crate::errors::EngineError;
use crate::types::{SkillInput, SkillOutput};
use async_trait::async_trait;
use std::time::Duration;

/// Per-invocation options passed alongside the input
#[derive(Debug, Clone, Default)]
pub struct SkillOptions {
    /// Identifier of the task the invocation belongs to
    pub task_id: String,

    /// Upper bound on the invocation's wall time, enforced by the executor
    pub timeout: Option<Duration>,
}

impl SkillOptions {
    pub fn for_task(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Trait that all skills must implement
#[async_trait]
pub trait Skill: Send + Sync {
    /// Returns the name of the skill (matches its contract entry)
    fn name(&self) -> &str;

    /// One-line description, shown to the planner oracle
    fn description(&self) -> &str {
        ""
    }

    /// Input fields that must be present in `SkillInput` before `run` is called.
    ///
    /// This is an input-shape check, separate from the state contract's
    /// `requires` set.
    fn required_inputs(&self) -> &[&'static str] {
        &[]
    }

    /// Wall-time limit this skill needs, overriding the executor default.
    ///
    /// An explicit `SkillOptions::timeout` still takes precedence.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Perform the skill
    async fn run(&self, input: SkillInput, options: &SkillOptions)
        -> Result<SkillOutput, EngineError>;
}
