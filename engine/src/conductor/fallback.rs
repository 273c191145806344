//! Deterministic fallback planner
//!
//! Used when the oracle is unreachable, its answer is unreadable, or its
//! repaired plan is empty. For each missing goal key the producer with the
//! fewest unmet requires is chosen (declaration order breaks ties) and its
//! own missing requires are resolved first, giving a dependency-ordered
//! chain. Only the first `max_plan_steps` entries are returned.

use sdk::errors::EngineError;
use std::collections::HashSet;

use super::planner::PlanningView;
use super::types::PlanStep;
use crate::state::{has_state, SkillContract};

pub fn fallback_plan(
    missing_goal: &[String],
    view: &PlanningView<'_>,
) -> Result<Vec<PlanStep>, EngineError> {
    let mut search = Search {
        view,
        chain: Vec::new(),
        resolving: HashSet::new(),
    };

    for key in missing_goal {
        search.resolve(key, 0)?;
        if search.full() {
            break;
        }
    }

    let mut chain = search.chain;
    chain.truncate(view.settings.max_plan_steps);
    Ok(chain)
}

struct Search<'v, 'a> {
    view: &'v PlanningView<'a>,
    chain: Vec<PlanStep>,
    resolving: HashSet<String>,
}

impl<'v, 'a> Search<'v, 'a> {
    /// The chain is append-only, so once it holds `max_plan_steps` entries
    /// the returned prefix cannot change.
    fn full(&self) -> bool {
        self.chain.len() >= self.view.settings.max_plan_steps
    }

    fn planned(&self, key: &str) -> bool {
        self.chain.iter().any(|step| {
            self.view
                .contracts
                .get(&step.skill)
                .is_some_and(|c| c.produces_key(key))
        })
    }

    fn resolve(&mut self, key: &str, depth: usize) -> Result<(), EngineError> {
        if self.full() || has_state(self.view.store, key) || self.planned(key) {
            return Ok(());
        }
        if depth > self.view.settings.max_repair_depth {
            return Err(EngineError::RepairDepthExceeded {
                key: key.to_string(),
                limit: self.view.settings.max_repair_depth,
            });
        }
        if !self.resolving.insert(key.to_string()) {
            tracing::debug!("Dependency cycle through '{}', skipping", key);
            return Ok(());
        }

        let Some(producer) = self.choose(key) else {
            tracing::warn!("Fallback planner: no available skill produces '{}'", key);
            self.resolving.remove(key);
            return Ok(());
        };

        for missing in producer.unmet_requires(self.view.store) {
            self.resolve(&missing, depth + 1)?;
        }

        if !self.chain.iter().any(|s| s.skill == producer.name) {
            self.chain.push(PlanStep::new(
                &producer.name,
                key,
                format!("fallback: produces '{}'", key),
            ));
        }
        self.resolving.remove(key);
        Ok(())
    }

    /// Uncapped producer with the fewest unmet requires, first on ties
    fn choose(&self, key: &str) -> Option<&'v SkillContract> {
        let view = self.view;
        view.contracts
            .producers_of(key)
            .into_iter()
            .filter(|c| !view.capped(&c.name))
            .min_by_key(|c| c.unmet_requires(view.store).len())
    }
}
