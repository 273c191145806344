//! Violation merge, scoring and status

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::rules::{has_error, Violation};

/// Overall verdict of one gate pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateStatus {
    Pass,
    Fail,
}

impl GateStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
        }
    }
}

impl fmt::Display for GateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concatenate stage results, drop repeated messages (first occurrence
/// wins) and order by severity. The sort is stable, so equal severities keep
/// their stage order.
pub fn merge<I>(stages: I) -> Vec<Violation>
where
    I: IntoIterator<Item = Vec<Violation>>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged: Vec<Violation> = stages
        .into_iter()
        .flatten()
        .filter(|v| seen.insert(v.dedupe_key().to_string()))
        .collect();
    merged.sort_by_key(|v| v.severity.rank());
    merged
}

/// 100 minus the severity penalties, floored at 0
pub fn score(violations: &[Violation]) -> u8 {
    let penalty: u32 = violations
        .iter()
        .map(|v| u32::from(v.severity.penalty()))
        .sum();
    100u32.saturating_sub(penalty) as u8
}

/// FAIL if any violation is ERROR or FATAL
pub fn status(violations: &[Violation]) -> GateStatus {
    if has_error(violations) {
        GateStatus::Fail
    } else {
        GateStatus::Pass
    }
}
