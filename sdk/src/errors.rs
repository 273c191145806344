//! Error types and handling
//!
//! This module provides the error types used throughout the Loom engine.
//! All errors implement the `LoomErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! Recoverable errors are the ones the control loop absorbs and degrades
//! around (a failed oracle call, a non-critical skill failure). Non-recoverable
//! errors abort the current task and are surfaced to the caller.

use thiserror::Error;

/// Trait for Loom error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait LoomErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors degrade precision (a fallback path is taken) rather
    /// than aborting the task.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Oracle**: Provider failures, timeouts, unparsable answers
/// - **Planning**: No executable plan, repair depth exhausted
/// - **Contract**: Unknown skills, missing declared input fields, skill failures
/// - **Validation**: Rule loading errors
/// - **Gate**: Commit blocked, rewrite budget exhausted
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, LoomErrorExt};
///
/// let error = EngineError::MissingInput {
///     skill: "writeDraft".to_string(),
///     field: "chapterPlan".to_string(),
/// };
/// assert!(error.is_recoverable());
///
/// let fatal = EngineError::CriticalSkillFailed {
///     skill: "persistChapter".to_string(),
///     reason: "disk full".to_string(),
/// };
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Oracle errors
    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    #[error("All LLM providers exhausted")]
    AllProvidersExhausted,

    #[error("Oracle call timed out")]
    OracleTimeout,

    #[error("Oracle answer could not be parsed: {0}")]
    OracleParse(String),

    // Contract errors
    #[error("Unknown skill: {0}")]
    UnknownSkill(String),

    #[error("Skill {skill} is missing required input field '{field}'")]
    MissingInput { skill: String, field: String },

    #[error("Skill {skill} failed: {reason}")]
    SkillFailed { skill: String, reason: String },

    #[error("Critical skill {skill} failed: {reason}")]
    CriticalSkillFailed { skill: String, reason: String },

    #[error("Invalid state key: {0}")]
    InvalidStateKey(String),

    // Planning errors
    #[error("Planning failed: {0}")]
    PlanningFailed(String),

    #[error("Prerequisite repair exceeded depth {limit} while resolving '{key}'")]
    RepairDepthExceeded { key: String, limit: usize },

    #[error("Task exceeded {0} iterations")]
    IterationLimit(usize),

    #[error("Task cancelled")]
    Cancelled,

    // Validation errors
    #[error("Rule load error: {0}")]
    RuleLoad(String),

    // Gate errors
    #[error("Commit blocked: consistency gate status is FAIL ({violations} blocking violations)")]
    CommitBlocked { violations: usize },

    #[error("Consistency gate still failing after {attempts} attempts (score {score})")]
    GateExhausted { attempts: usize, score: u8 },

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LoomErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",

            Self::LLMProvider(_) => "LLM provider unavailable. Check your API keys and network",
            Self::AllProvidersExhausted => "No LLM providers available. Check configuration",
            Self::OracleTimeout => "LLM provider took too long to respond. Try again",
            Self::OracleParse(_) => "The model returned an answer that could not be read",

            Self::UnknownSkill(_) => "The requested skill is not registered",
            Self::MissingInput { .. } => "A skill was invoked without one of its declared inputs",
            Self::SkillFailed { .. } => "A skill failed; the task continued without it",
            Self::CriticalSkillFailed { .. } => "A commit step failed. Nothing further was run",
            Self::InvalidStateKey(_) => "State keys are dot-separated identifiers",

            Self::PlanningFailed(_) => "No executable plan could be found for this request",
            Self::RepairDepthExceeded { .. } => {
                "The skill dependency chain is too deep to resolve automatically"
            }
            Self::IterationLimit(_) => "Task too complex. Try breaking it into smaller steps",
            Self::Cancelled => "The task was cancelled",

            Self::RuleLoad(_) => "Check your rule files for unknown scopes or levels",

            Self::CommitBlocked { .. } => "Resolve the reported violations before finalizing",
            Self::GateExhausted { .. } => "Rewrites did not resolve the violations. Review them",

            Self::Io(_) => "File system operation failed",
            Self::Serialization(_) => "Data could not be serialized",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::Config(_)
            | Self::CriticalSkillFailed { .. }
            | Self::RepairDepthExceeded { .. }
            | Self::IterationLimit(_)
            | Self::Cancelled
            | Self::RuleLoad(_)
            | Self::GateExhausted { .. } => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_input_message_names_field() {
        let error = EngineError::MissingInput {
            skill: "writeDraft".to_string(),
            field: "chapterPlan".to_string(),
        };
        let text = error.to_string();
        assert!(text.contains("writeDraft"));
        assert!(text.contains("chapterPlan"));
    }

    #[test]
    fn test_gate_errors_are_terminal() {
        assert!(!EngineError::GateExhausted { attempts: 3, score: 40 }.is_recoverable());
        assert!(EngineError::CommitBlocked { violations: 2 }.is_recoverable());
    }

    #[test]
    fn test_every_variant_has_hint() {
        let errors = vec![
            EngineError::Config("x".into()),
            EngineError::AllProvidersExhausted,
            EngineError::OracleTimeout,
            EngineError::UnknownSkill("x".into()),
            EngineError::PlanningFailed("x".into()),
            EngineError::Cancelled,
        ];
        for error in errors {
            assert!(!error.user_hint().is_empty());
        }
    }
}
