//! Execution count table
//!
//! Per-task record of how often each skill ran and whether its last run
//! failed. Owned by one planner and reset at task start.

use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionCounts {
    runs: HashMap<String, u32>,
    last_failed: HashMap<String, bool>,
}

impl ExecutionCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one execution and remember its outcome
    pub fn record(&mut self, skill: &str, success: bool) {
        *self.runs.entry(skill.to_string()).or_insert(0) += 1;
        self.last_failed.insert(skill.to_string(), !success);
    }

    pub fn runs(&self, skill: &str) -> u32 {
        self.runs.get(skill).copied().unwrap_or(0)
    }

    pub fn has_run(&self, skill: &str) -> bool {
        self.runs(skill) > 0
    }

    /// True if the skill ran and its most recent run failed
    pub fn last_failed(&self, skill: &str) -> bool {
        self.last_failed.get(skill).copied().unwrap_or(false)
    }

    pub fn reached(&self, skill: &str, cap: u32) -> bool {
        self.runs(skill) >= cap
    }

    pub fn total(&self) -> u32 {
        self.runs.values().sum()
    }

    pub fn reset(&mut self) {
        self.runs.clear();
        self.last_failed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_cap() {
        let mut counts = ExecutionCounts::new();
        assert!(!counts.has_run("writeDraft"));

        counts.record("writeDraft", true);
        counts.record("writeDraft", false);
        assert_eq!(counts.runs("writeDraft"), 2);
        assert!(counts.last_failed("writeDraft"));
        assert!(!counts.reached("writeDraft", 3));

        counts.record("writeDraft", true);
        assert!(!counts.last_failed("writeDraft"));
        assert!(counts.reached("writeDraft", 3));
        assert_eq!(counts.total(), 3);

        counts.reset();
        assert_eq!(counts.runs("writeDraft"), 0);
    }
}
