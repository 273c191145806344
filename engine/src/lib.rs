//! Loom Engine Library
//!
//! Goal-directed chapter scheduling: a state store and skill contract table,
//! a replanning conductor with an oracle planner and a deterministic
//! fallback, a rule engine, and the four-stage consistency gate.
//! It is used by both the main binary and integration tests.

/// Engine assembly from configuration
pub mod app;

/// CLI interface module
pub mod cli;

/// Conductor orchestration module
pub mod conductor;

/// Configuration management module
pub mod config;

/// Narrative context, event extraction and writing intent
pub mod context;

/// Consistency gate
pub mod gate;

/// CLI command handlers
pub mod handlers;

/// LLM provider abstraction layer
pub mod llm;

/// Rule DSL and rule engine
pub mod rules;

/// Built-in skills
pub mod skills;

/// State store, presence predicate and contract table
pub mod state;

/// Telemetry and Observability
pub mod telemetry;
