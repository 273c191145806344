//! Skill contract table
//!
//! Static map from skill name to the state keys it needs (`requires`) and the
//! keys it writes (`produces`). The planner reasons only over this table;
//! declaration order is significant because every "first match" tie-break in
//! planning follows it.
//!
//! A contract may also declare `revises`: keys it can overwrite but never
//! counts as producing. The planner never picks a skill to obtain a revised
//! key, so revising cannot introduce a dependency cycle.

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use super::presence::has_state;
use super::store::{validate_key, StateStore};

/// Declared state contract of one skill
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillContract {
    pub name: String,
    pub requires: Vec<String>,
    pub produces: Vec<String>,
    /// Existing keys the skill may rewrite alongside its products
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub revises: Vec<String>,
    #[serde(default)]
    pub description: String,
}

impl SkillContract {
    pub fn new(name: &str, requires: &[&str], produces: &[&str], description: &str) -> Self {
        Self {
            name: name.to_string(),
            requires: requires.iter().map(|k| k.to_string()).collect(),
            produces: produces.iter().map(|k| k.to_string()).collect(),
            revises: Vec::new(),
            description: description.to_string(),
        }
    }

    pub fn with_revises(mut self, keys: &[&str]) -> Self {
        self.revises = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    /// Requires that are not present in the store
    pub fn unmet_requires(&self, store: &StateStore) -> Vec<String> {
        self.requires
            .iter()
            .filter(|key| !has_state(store, key))
            .cloned()
            .collect()
    }

    pub fn requires_met(&self, store: &StateStore) -> bool {
        self.requires.iter().all(|key| has_state(store, key))
    }

    /// True when every produced key is already present
    pub fn produces_satisfied(&self, store: &StateStore) -> bool {
        self.produces.iter().all(|key| has_state(store, key))
    }

    /// True if one of this contract's produced keys yields `key`
    pub fn produces_key(&self, key: &str) -> bool {
        self.produces.iter().any(|produced| key_covers(produced, key))
    }

    /// True if the skill is allowed to write `key`
    pub fn writes_key(&self, key: &str) -> bool {
        self.produces_key(key) || self.revises.iter().any(|revised| key_covers(revised, key))
    }
}

/// True if writing `produced` can make `key` present: same key, or `key`
/// nested under `produced`.
pub fn key_covers(produced: &str, key: &str) -> bool {
    produced == key
        || key
            .strip_prefix(produced)
            .is_some_and(|rest| rest.starts_with('.'))
}

/// Ordered catalogue of skill contracts
#[derive(Debug, Clone, Default)]
pub struct ContractTable {
    contracts: Vec<SkillContract>,
}

impl ContractTable {
    /// Build a table, checking names are unique, keys are well formed and
    /// `produces` is never empty.
    pub fn new(contracts: Vec<SkillContract>) -> Result<Self, EngineError> {
        let mut seen = HashSet::new();
        for contract in &contracts {
            if !seen.insert(contract.name.as_str()) {
                return Err(EngineError::Config(format!(
                    "duplicate skill contract '{}'",
                    contract.name
                )));
            }
            if contract.produces.is_empty() {
                return Err(EngineError::Config(format!(
                    "skill contract '{}' produces nothing",
                    contract.name
                )));
            }
            let declared = contract
                .requires
                .iter()
                .chain(contract.produces.iter())
                .chain(contract.revises.iter());
            for key in declared {
                validate_key(key)?;
            }
        }
        Ok(Self { contracts })
    }

    /// The built-in chapter-writing catalogue
    pub fn default_catalogue() -> Self {
        let contracts = vec![
            SkillContract::new(
                "loadContext",
                &[],
                &["worldRules", "characters", "plotState"],
                "Load world rules, the character roster and the current plot state",
            ),
            SkillContract::new(
                "planChapter",
                &["worldRules", "characters", "plotState"],
                &["chapterPlan"],
                "Outline the chapter's beats from the loaded context and the request",
            ),
            SkillContract::new(
                "writeDraft",
                &["chapterPlan"],
                &["draftContent"],
                "Write the chapter draft following the chapter plan",
            ),
            SkillContract::new(
                "extractEvents",
                &["draftContent"],
                &["extractedEvents"],
                "Extract events and character state transitions from the draft",
            ),
            SkillContract::new(
                "checkConsistency",
                &["draftContent", "extractedEvents"],
                &["checkResults"],
                "Run the four-stage consistency gate over the draft, revising it on failure",
            )
            .with_revises(&["draftContent", "extractedEvents"]),
            SkillContract::new(
                "finalizeChapter",
                &["draftContent", "checkResults.overall"],
                &["finalContent"],
                "Promote a draft that passed the consistency gate to final content",
            ),
            SkillContract::new(
                "persistChapter",
                &["finalContent"],
                &["persisted"],
                "Write the final chapter to the workspace",
            ),
            SkillContract::new(
                "summarizeChapter",
                &["finalContent"],
                &["chapterSummary"],
                "Summarize the final chapter for later planning",
            ),
        ];
        Self { contracts }
    }

    pub fn get(&self, name: &str) -> Option<&SkillContract> {
        self.contracts.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Contracts in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &SkillContract> {
        self.contracts.iter()
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Contracts producing `key`, in declaration order
    pub fn producers_of(&self, key: &str) -> Vec<&SkillContract> {
        self.contracts
            .iter()
            .filter(|c| c.produces_key(key))
            .collect()
    }

    /// Every key mentioned anywhere in the table, sorted
    pub fn all_keys(&self) -> BTreeSet<&str> {
        self.contracts
            .iter()
            .flat_map(|c| c.requires.iter().chain(c.produces.iter()))
            .map(String::as_str)
            .collect()
    }

    /// Goal keys that no chain of contracts can ever produce.
    ///
    /// A key is reachable when some producer exists whose own requires are
    /// all reachable.
    pub fn unreachable_keys<'a, I>(&self, goal: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut reachable: HashSet<String> = HashSet::new();
        loop {
            let mut grew = false;
            for contract in &self.contracts {
                let ready = contract
                    .requires
                    .iter()
                    .all(|req| reachable.iter().any(|r| key_covers(r, req)));
                if ready {
                    for key in &contract.produces {
                        grew |= reachable.insert(key.clone());
                    }
                }
            }
            if !grew {
                break;
            }
        }

        goal.into_iter()
            .filter(|key| !reachable.iter().any(|r| key_covers(r, key)))
            .cloned()
            .collect()
    }
}
