//! Conductor System
//!
//! Goal-directed scheduling: the planner proposes a short plan, repair and
//! fallback keep it executable, the executor dispatches one skill and the
//! runner replans after every step.

pub mod counts;
pub mod executor;
pub mod fallback;
pub mod intent;
pub mod planner;
pub mod repair;
pub mod runner;
pub mod types;

pub use counts::ExecutionCounts;
pub use executor::{ExecutionResult, Executor, SkillRegistry};
pub use intent::IntentKind;
pub use planner::{Planner, PlannerSettings, PlanningView};
pub use runner::{CancellationFlag, StepRecord, TaskReport, TaskRunner};
pub use types::{Plan, PlanSource, PlanStep};
