//! Loom SDK
//!
//! Shared library providing traits, types, and utilities for Loom components.
//! This crate is used by the engine and by out-of-tree skill implementations.

/// Skill trait and invocation options
pub mod skill;

/// Error types and handling
pub mod errors;

/// Skill input/output types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, LoomErrorExt};
pub use skill::{Skill, SkillOptions};
pub use types::{InputError, SkillInput, SkillOutput};
