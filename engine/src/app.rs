//! Engine assembly
//!
//! Builds the oracle chain, loads the rule catalogue and wires the gate,
//! planner, skill registry and runner from one `Config`. The CLI handlers
//! and the integration tests both start here.

use sdk::errors::EngineError;
use std::sync::Arc;

use crate::conductor::{Executor, Planner, PlannerSettings, TaskRunner};
use crate::config::Config;
use crate::context::{ContextProvider, OracleEventExtractor};
use crate::gate::{ConsistencyGate, TextLayer};
use crate::llm::offline::OfflineProvider;
use crate::llm::ollama::OllamaProvider;
use crate::llm::openai::OpenAIProvider;
use crate::llm::router::LLMRouter;
use crate::llm::{LLMProvider, OracleClient};
use crate::rules::{load_rule_set, RuleEngine};
use crate::skills::{builtin_registry, SkillDeps};
use crate::state::ContractTable;

/// Oracle client for the configured providers, or the offline provider
pub fn build_oracle(config: &Config, offline: bool) -> OracleClient {
    if offline {
        tracing::info!("Offline mode: every plan comes from the fallback planner");
        return OracleClient::from_config(Arc::new(OfflineProvider), &config.llm);
    }

    let mut providers: Vec<Box<dyn LLMProvider>> = vec![Box::new(OllamaProvider::new(
        config.llm.ollama.base_url.clone(),
        config.llm.ollama.model.clone(),
    ))];

    let openai = OpenAIProvider::from_env(config.llm.openai.clone());
    if openai.has_key() {
        providers.push(Box::new(openai));
    } else {
        tracing::debug!("OPENAI_API_KEY not set, OpenAI provider disabled");
    }

    let router = LLMRouter::new(providers, Arc::new(config.llm.clone()));
    OracleClient::from_config(Arc::new(router), &config.llm)
}

/// Fully wired engine
pub struct Loom {
    config: Config,
    oracle: OracleClient,
    contracts: Arc<ContractTable>,
    gate: Arc<ConsistencyGate>,
}

impl Loom {
    /// Wire the engine around `oracle`, loading the configured rule sources
    pub fn new(config: Config, oracle: OracleClient) -> Result<Self, EngineError> {
        let rules = load_rule_set(&config.rules)?;
        tracing::info!("Loaded {} consistency rules", rules.len());

        let engine = RuleEngine::new(oracle.clone(), rules).with_batched(config.rules.batched);
        let mut gate = ConsistencyGate::new(Arc::new(engine))
            .with_extractor(Arc::new(OracleEventExtractor::new(oracle.clone())));
        if config.gate.text_layer {
            gate = gate.with_text_layer(TextLayer::new(oracle.clone()));
        }

        Ok(Self {
            config,
            oracle,
            contracts: Arc::new(ContractTable::default_catalogue()),
            gate: Arc::new(gate),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn oracle(&self) -> &OracleClient {
        &self.oracle
    }

    pub fn contracts(&self) -> &ContractTable {
        &self.contracts
    }

    pub fn gate(&self) -> &ConsistencyGate {
        &self.gate
    }

    /// A fresh planner with its own execution counts
    pub fn planner(&self) -> Planner {
        Planner::new(
            Arc::clone(&self.contracts),
            Some(self.oracle.clone()),
            PlannerSettings::from(&self.config.planner),
        )
    }

    /// Runner for one task, reading narrative context from `context`
    pub fn runner(&self, context: Arc<dyn ContextProvider>) -> TaskRunner {
        let registry = builtin_registry(SkillDeps {
            oracle: self.oracle.clone(),
            context,
            extractor: Arc::new(OracleEventExtractor::new(self.oracle.clone())),
            gate: Arc::clone(&self.gate),
            workspace: self.config.core.workspace.clone(),
            rewrite_budget: self.config.gate.rewrite_budget,
            check_time_limit: self.config.check_time_limit(),
        });
        let executor = Executor::from_config(registry, &self.config.planner);
        TaskRunner::new(self.planner(), executor, self.config.planner.max_iterations)
    }
}
