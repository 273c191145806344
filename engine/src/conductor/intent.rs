//! Intent table
//!
//! Maps each request category to the state keys whose presence means the
//! request is done.

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    WriteChapter,
    PlanChapter,
    DraftChapter,
    CheckChapter,
    PublishChapter,
    SummarizeChapter,
}

impl IntentKind {
    pub const ALL: [IntentKind; 6] = [
        IntentKind::WriteChapter,
        IntentKind::PlanChapter,
        IntentKind::DraftChapter,
        IntentKind::CheckChapter,
        IntentKind::PublishChapter,
        IntentKind::SummarizeChapter,
    ];

    /// Goal state keys
    pub fn goal(self) -> Vec<String> {
        let keys: &[&str] = match self {
            Self::WriteChapter => &["finalContent"],
            Self::PlanChapter => &["chapterPlan"],
            Self::DraftChapter => &["draftContent"],
            Self::CheckChapter => &["checkResults.overall"],
            Self::PublishChapter => &["persisted"],
            Self::SummarizeChapter => &["chapterSummary"],
        };
        keys.iter().map(|k| k.to_string()).collect()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WriteChapter => "write_chapter",
            Self::PlanChapter => "plan_chapter",
            Self::DraftChapter => "draft_chapter",
            Self::CheckChapter => "check_chapter",
            Self::PublishChapter => "publish_chapter",
            Self::SummarizeChapter => "summarize_chapter",
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|k| k.as_str()).collect();
                EngineError::PlanningFailed(format!(
                    "unknown intent '{}' (expected one of: {})",
                    s,
                    known.join(", ")
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ContractTable;

    #[test]
    fn test_parse_round_trip() {
        for kind in IntentKind::ALL {
            assert_eq!(kind.as_str().parse::<IntentKind>().unwrap(), kind);
        }
        assert_eq!(
            "Write-Chapter".parse::<IntentKind>().unwrap(),
            IntentKind::WriteChapter
        );
        assert!("rewrite_everything".parse::<IntentKind>().is_err());
    }

    #[test]
    fn test_every_goal_reachable_in_default_catalogue() {
        let table = ContractTable::default_catalogue();
        for kind in IntentKind::ALL {
            assert!(
                table.unreachable_keys(&kind.goal()).is_empty(),
                "{} has an unreachable goal",
                kind
            );
        }
    }
}
