//! Built-in skill catalogue
//!
//! Wires the chapter skills to their collaborators and registers them under
//! the names the default contract table uses.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub mod builtin;

pub use builtin::{
    compose_prompt, CheckConsistency, ExtractEvents, FinalizeChapter, LoadContext, OracleDrafter,
    PersistChapter, PlanChapter, SummarizeChapter, WriteDraft,
};

use crate::conductor::SkillRegistry;
use crate::context::{ContextProvider, EventExtractor};
use crate::gate::ConsistencyGate;
use crate::llm::OracleClient;

/// Collaborators the built-in skills need
pub struct SkillDeps {
    pub oracle: OracleClient,
    pub context: Arc<dyn ContextProvider>,
    pub extractor: Arc<dyn EventExtractor>,
    pub gate: Arc<ConsistencyGate>,
    /// Directory `persistChapter` writes into
    pub workspace: PathBuf,
    /// Redrafts `checkConsistency` may request; 0 disables rewriting
    pub rewrite_budget: usize,
    /// Wall time for one `checkConsistency` run, rewrites included
    pub check_time_limit: Duration,
}

/// Registry holding one implementation per default contract
pub fn builtin_registry(deps: SkillDeps) -> SkillRegistry {
    let mut check = CheckConsistency::new(deps.gate).with_time_limit(deps.check_time_limit);
    if deps.rewrite_budget > 0 {
        check = check.with_rewrites(
            Arc::new(OracleDrafter::new(deps.oracle.clone())),
            deps.rewrite_budget,
        );
    }

    SkillRegistry::new()
        .with(Arc::new(LoadContext::new(deps.context)))
        .with(Arc::new(PlanChapter::new(deps.oracle.clone())))
        .with(Arc::new(WriteDraft::new(deps.oracle.clone())))
        .with(Arc::new(ExtractEvents::new(deps.extractor)))
        .with(Arc::new(check))
        .with(Arc::new(FinalizeChapter))
        .with(Arc::new(PersistChapter::new(deps.workspace)))
        .with(Arc::new(SummarizeChapter::new(deps.oracle)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{OracleEventExtractor, StaticContextProvider};
    use crate::llm::scripted::ScriptedProvider;
    use crate::rules::{RuleEngine, RuleSet};
    use crate::state::ContractTable;

    #[test]
    fn test_registry_covers_default_catalogue() {
        let oracle = OracleClient::new(Arc::new(ScriptedProvider::always("{}")));
        let engine = RuleEngine::new(oracle.clone(), RuleSet::new(Vec::new()));
        let registry = builtin_registry(SkillDeps {
            oracle: oracle.clone(),
            context: Arc::new(StaticContextProvider::default()),
            extractor: Arc::new(OracleEventExtractor::new(oracle)),
            gate: Arc::new(ConsistencyGate::new(Arc::new(engine))),
            workspace: PathBuf::from("."),
            rewrite_budget: 3,
            check_time_limit: Duration::from_secs(60),
        });

        for contract in ContractTable::default_catalogue().iter() {
            let skill = registry.get(&contract.name).unwrap();
            assert_eq!(skill.description(), contract.description);
        }
        assert_eq!(registry.len(), 8);

        let check = registry.get("checkConsistency").unwrap();
        assert_eq!(check.timeout(), Some(Duration::from_secs(65)));
    }
}
