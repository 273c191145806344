//! Plan repair
//!
//! Checks an oracle proposal against the contract table, the store and the
//! execution counts, and rewrites it into steps that can actually run now.

use sdk::errors::EngineError;
use std::collections::HashSet;

use super::planner::PlanningView;
use super::types::PlanStep;

/// Validate and repair a proposed plan.
///
/// - unknown skills are dropped
/// - skills at their execution cap are dropped
/// - a step with unmet requires is deferred; executable producers of the
///   missing keys are spliced in instead
/// - a step whose produces are all present is dropped once the skill has
///   run, except for one confirming run of externally seeded state and for
///   the finalize skill after a failed attempt
///
/// Back-fill deeper than the configured repair depth fails the whole plan.
pub fn repair(
    proposed: Vec<PlanStep>,
    view: &PlanningView<'_>,
) -> Result<Vec<PlanStep>, EngineError> {
    let max_steps = view.settings.max_plan_steps;
    let mut plan: Vec<PlanStep> = Vec::new();

    for step in proposed {
        if plan.len() >= max_steps {
            break;
        }

        let Some(contract) = view.contracts.get(&step.skill) else {
            tracing::warn!("Dropping plan step for unknown skill '{}'", step.skill);
            continue;
        };

        if view.capped(&contract.name) {
            tracing::warn!(
                "Dropping plan step '{}': executed {} times already",
                contract.name,
                view.counts.runs(&contract.name)
            );
            continue;
        }

        let unmet = contract.unmet_requires(view.store);
        if !unmet.is_empty() {
            tracing::debug!(
                "Deferring '{}', missing {:?}; splicing prerequisites",
                contract.name,
                unmet
            );
            for key in &unmet {
                let mut resolving = HashSet::new();
                for prep in prerequisites(key, &contract.name, view, 1, &mut resolving)? {
                    push_unique(&mut plan, prep, max_steps);
                }
            }
            continue;
        }

        if contract.produces_satisfied(view.store) && !may_rerun(&contract.name, view) {
            tracing::debug!(
                "Dropping plan step '{}': outputs present and skill already ran",
                contract.name
            );
            continue;
        }

        push_unique(&mut plan, step, max_steps);
    }

    Ok(plan)
}

/// Whether a skill whose outputs are already present may run again
fn may_rerun(skill: &str, view: &PlanningView<'_>) -> bool {
    if view.is_finalize(skill) && view.counts.last_failed(skill) {
        return true;
    }
    !view.counts.has_run(skill)
}

/// Executable steps that make progress toward `key`.
///
/// The first producer (declaration order) whose requires are met is used.
/// When no producer is ready, the first uncapped producer's own missing
/// requires are resolved one level deeper.
fn prerequisites(
    key: &str,
    needed_by: &str,
    view: &PlanningView<'_>,
    depth: usize,
    resolving: &mut HashSet<String>,
) -> Result<Vec<PlanStep>, EngineError> {
    if depth > view.settings.max_repair_depth {
        return Err(EngineError::RepairDepthExceeded {
            key: key.to_string(),
            limit: view.settings.max_repair_depth,
        });
    }
    if !resolving.insert(key.to_string()) {
        return Ok(Vec::new());
    }

    let producers: Vec<_> = view
        .contracts
        .producers_of(key)
        .into_iter()
        .filter(|c| !view.capped(&c.name))
        .collect();

    let Some(first) = producers.first() else {
        tracing::warn!("No available skill produces '{}' (needed by '{}')", key, needed_by);
        return Ok(Vec::new());
    };

    if let Some(ready) = producers.iter().find(|c| c.requires_met(view.store)) {
        return Ok(vec![PlanStep::new(
            &ready.name,
            key,
            format!("prerequisite '{}' for {}", key, needed_by),
        )]);
    }

    let mut steps = Vec::new();
    for missing in first.unmet_requires(view.store) {
        steps.extend(prerequisites(&missing, &first.name, view, depth + 1, resolving)?);
    }
    Ok(steps)
}

fn push_unique(plan: &mut Vec<PlanStep>, step: PlanStep, max_steps: usize) {
    if plan.len() < max_steps && !plan.iter().any(|s| s.skill == step.skill) {
        plan.push(step);
    }
}
