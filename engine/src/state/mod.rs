//! Task State
//!
//! The task-scoped blackboard, the presence predicate and the skill
//! contract table the planner reasons over.

pub mod contract;
pub mod presence;
pub mod store;

pub use contract::{key_covers, ContractTable, SkillContract};
pub use presence::{goal_satisfied, has_state, is_allow_empty, missing_keys, ALLOW_EMPTY_KEYS};
pub use store::{validate_key, StateStore};
