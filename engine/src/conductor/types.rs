//! Conductor Types

use serde::{Deserialize, Serialize};

/// One proposed step. A proposal only: repair decides whether it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub skill: String,
    /// State key the step is meant to produce
    pub target: String,
    pub rationale: String,
}

impl PlanStep {
    pub fn new(
        skill: impl Into<String>,
        target: impl Into<String>,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            skill: skill.into(),
            target: target.into(),
            rationale: rationale.into(),
        }
    }
}

/// Where a plan came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    /// Goal already satisfied; nothing to do
    Satisfied,
    /// Oracle proposal after repair
    Oracle,
    /// Deterministic dependency search
    Fallback,
}

/// Short-horizon plan returned by one planning call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
    pub source: PlanSource,
}

impl Plan {
    pub fn satisfied() -> Self {
        Self {
            steps: Vec::new(),
            source: PlanSource::Satisfied,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn first(&self) -> Option<&PlanStep> {
        self.steps.first()
    }

    pub fn skills(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.skill.as_str()).collect()
    }
}
