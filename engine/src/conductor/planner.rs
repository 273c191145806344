//! Conductor Planner
//!
//! Proposes the next one or two steps toward an intent's goal state. The
//! oracle is asked first; its proposal is checked and repaired against the
//! contract table. When the oracle cannot help, a deterministic dependency
//! search takes over. The planner is re-invoked after every executed step,
//! so a plan is never longer than the configured horizon.

use sdk::errors::EngineError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::counts::ExecutionCounts;
use super::fallback::fallback_plan;
use super::intent::IntentKind;
use super::repair::repair;
use super::types::{Plan, PlanSource, PlanStep};
use crate::config::PlannerConfig;
use crate::llm::{LLMError, OracleClient};
use crate::state::{goal_satisfied, missing_keys, ContractTable, StateStore};

/// Planner bounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerSettings {
    pub max_executions_per_skill: u32,
    pub max_plan_steps: usize,
    pub max_repair_depth: usize,
    pub finalize_skill: Option<String>,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self::from(&PlannerConfig::default())
    }
}

impl From<&PlannerConfig> for PlannerSettings {
    fn from(config: &PlannerConfig) -> Self {
        Self {
            max_executions_per_skill: config.max_executions_per_skill,
            max_plan_steps: config.max_plan_steps.max(1),
            max_repair_depth: config.max_repair_depth,
            finalize_skill: Some(config.finalize_skill.clone()).filter(|s| !s.is_empty()),
        }
    }
}

/// Read-only view shared by repair and fallback
pub struct PlanningView<'a> {
    pub contracts: &'a ContractTable,
    pub store: &'a StateStore,
    pub counts: &'a ExecutionCounts,
    pub settings: &'a PlannerSettings,
}

impl PlanningView<'_> {
    pub fn capped(&self, skill: &str) -> bool {
        self.counts
            .reached(skill, self.settings.max_executions_per_skill)
    }

    pub fn is_finalize(&self, skill: &str) -> bool {
        self.settings.finalize_skill.as_deref() == Some(skill)
    }

    /// Why no plan can obtain `key`
    pub fn unobtainable(&self, key: &str) -> String {
        let producers = self.contracts.producers_of(key);
        if producers.is_empty() {
            return format!("no skill produces '{}'", key);
        }
        if producers.iter().all(|c| self.capped(&c.name)) {
            let names: Vec<&str> = producers.iter().map(|c| c.name.as_str()).collect();
            return format!(
                "every producer of '{}' ({}) reached the execution cap of {}",
                key,
                names.join(", "),
                self.settings.max_executions_per_skill
            );
        }
        format!("'{}' is only reachable through a dependency cycle", key)
    }
}

/// Step as the oracle writes it
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawStep {
    Name(String),
    Full {
        #[serde(alias = "name")]
        skill: String,
        #[serde(default)]
        produces: Option<Value>,
        #[serde(default, alias = "rationale")]
        reason: Option<String>,
    },
}

impl RawStep {
    fn into_step(self) -> PlanStep {
        match self {
            Self::Name(skill) => PlanStep::new(skill, "", ""),
            Self::Full {
                skill,
                produces,
                reason,
            } => {
                let target = match produces {
                    Some(Value::String(s)) => s,
                    Some(Value::Array(items)) => items
                        .first()
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    _ => String::new(),
                };
                PlanStep::new(skill, target, reason.unwrap_or_default())
            }
        }
    }
}

const PLANNER_SYSTEM_PROMPT: &str = "You are the task planner of a chapter-writing engine.\n\
Pick the next skills to run so that the missing goal keys become present.\n\
A skill can only run when every key it requires is present.\n\
Answer with ONLY a JSON object:\n\
{\"steps\": [{\"skill\": string, \"produces\": string, \"reason\": string}]}\n\
List at most the number of steps you are asked for, in execution order.";

pub struct Planner {
    contracts: Arc<ContractTable>,
    oracle: Option<OracleClient>,
    settings: PlannerSettings,
    counts: ExecutionCounts,
}

impl Planner {
    pub fn new(
        contracts: Arc<ContractTable>,
        oracle: Option<OracleClient>,
        settings: PlannerSettings,
    ) -> Self {
        Self {
            contracts,
            oracle,
            settings,
            counts: ExecutionCounts::new(),
        }
    }

    pub fn contracts(&self) -> &ContractTable {
        &self.contracts
    }

    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    pub fn counts(&self) -> &ExecutionCounts {
        &self.counts
    }

    /// Feed one execution outcome back into the count table
    pub fn record_outcome(&mut self, skill: &str, success: bool) {
        self.counts.record(skill, success);
    }

    /// Forget all execution history (task start)
    pub fn reset(&mut self) {
        self.counts.reset();
    }

    fn view<'a>(&'a self, store: &'a StateStore) -> PlanningView<'a> {
        PlanningView {
            contracts: &self.contracts,
            store,
            counts: &self.counts,
            settings: &self.settings,
        }
    }

    /// Plan the next steps toward `intent`'s goal
    pub async fn plan(
        &self,
        intent: IntentKind,
        store: &StateStore,
        request: &str,
    ) -> Result<Plan, EngineError> {
        self.plan_for_goal(&intent.goal(), intent.as_str(), store, request)
            .await
    }

    /// Plan the next steps toward an explicit goal key set
    pub async fn plan_for_goal(
        &self,
        goal: &[String],
        intent: &str,
        store: &StateStore,
        request: &str,
    ) -> Result<Plan, EngineError> {
        if goal_satisfied(goal, store) {
            tracing::debug!("Goal already satisfied, no plan needed");
            return Ok(Plan::satisfied());
        }

        let unreachable = self.contracts.unreachable_keys(goal);
        if !unreachable.is_empty() {
            return Err(EngineError::PlanningFailed(format!(
                "no skill chain produces {:?}",
                unreachable
            )));
        }

        let missing = missing_keys(goal, store);

        if let Some(oracle) = &self.oracle {
            match self.consult(oracle, intent, store, request, &missing).await {
                Ok(proposed) => {
                    let proposed_skills: Vec<String> =
                        proposed.iter().map(|s| s.skill.clone()).collect();
                    let steps = repair(proposed, &self.view(store))?;
                    if !steps.is_empty() {
                        tracing::info!(
                            "Oracle plan {:?} repaired to {:?}",
                            proposed_skills,
                            steps.iter().map(|s| s.skill.as_str()).collect::<Vec<_>>()
                        );
                        return Ok(Plan {
                            steps,
                            source: PlanSource::Oracle,
                        });
                    }
                    tracing::warn!(
                        "Oracle plan {:?} had no executable step, using fallback",
                        proposed_skills
                    );
                }
                Err(e) => {
                    tracing::warn!("Planner oracle unavailable, using fallback: {}", e);
                }
            }
        }

        self.fallback(&missing, store)
    }

    /// Deterministic plan for the missing keys
    pub fn fallback(&self, missing: &[String], store: &StateStore) -> Result<Plan, EngineError> {
        let view = self.view(store);
        let steps = fallback_plan(missing, &view)?;

        let Some(first) = steps.first() else {
            let reasons: Vec<String> = missing
                .iter()
                .map(|key| view.unobtainable(key))
                .collect();
            return Err(EngineError::PlanningFailed(reasons.join("; ")));
        };
        if let Some(contract) = self.contracts.get(&first.skill) {
            if let Some(blocked) = contract.unmet_requires(store).first() {
                return Err(EngineError::PlanningFailed(format!(
                    "'{}' cannot run: {}",
                    first.skill,
                    view.unobtainable(blocked)
                )));
            }
        }

        tracing::info!(
            "Fallback plan: {:?}",
            steps.iter().map(|s| s.skill.as_str()).collect::<Vec<_>>()
        );
        Ok(Plan {
            steps,
            source: PlanSource::Fallback,
        })
    }

    async fn consult(
        &self,
        oracle: &OracleClient,
        intent: &str,
        store: &StateStore,
        request: &str,
        missing: &[String],
    ) -> Result<Vec<PlanStep>, LLMError> {
        let user = self.build_prompt(intent, store, request, missing);
        let answer = oracle.ask_json(PLANNER_SYSTEM_PROMPT, &user).await?;
        parse_steps(answer)
    }

    fn build_prompt(
        &self,
        intent: &str,
        store: &StateStore,
        request: &str,
        missing: &[String],
    ) -> String {
        let catalogue: Vec<Value> = self
            .contracts
            .iter()
            .map(|c| {
                let mut entry = json!({
                    "name": c.name,
                    "requires": c.requires,
                    "produces": c.produces,
                    "description": c.description,
                    "runs": self.counts.runs(&c.name),
                });
                if !c.revises.is_empty() {
                    entry["revises"] = json!(c.revises);
                }
                entry
            })
            .collect();

        format!(
            "Intent: {}\nRequest: {}\n\nSkills:\n{}\n\nState:\n{}\n\nMissing goal keys: {}\n\nPropose at most {} steps.",
            intent,
            request,
            serde_json::to_string_pretty(&catalogue).unwrap_or_default(),
            store.presence_summary(self.contracts.all_keys()),
            missing.join(", "),
            self.settings.max_plan_steps
        )
    }
}

/// Accept `{"steps": [...]}`, `{"plan": [...]}` or a bare array
fn parse_steps(answer: Value) -> Result<Vec<PlanStep>, LLMError> {
    let list = match answer {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("steps").or_else(|| map.remove("plan")) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(LLMError::ParseError(
                    "plan answer has no steps array".to_string(),
                ))
            }
        },
        _ => {
            return Err(LLMError::ParseError(
                "plan answer is not an object".to_string(),
            ))
        }
    };

    Ok(list
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<RawStep>(item) {
            Ok(raw) => Some(raw.into_step()),
            Err(e) => {
                tracing::warn!("Ignoring malformed plan step: {}", e);
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::scripted::ScriptedProvider;
    use crate::llm::OracleReply;

    fn planner(provider: Option<ScriptedProvider>) -> Planner {
        Planner::new(
            Arc::new(ContractTable::default_catalogue()),
            provider.map(|p| OracleClient::new(Arc::new(p))),
            PlannerSettings::default(),
        )
    }

    #[test]
    fn test_parse_steps_shapes() {
        let steps = parse_steps(json!({"steps": [
            {"skill": "writeDraft", "produces": "draftContent", "reason": "plan exists"},
            {"name": "extractEvents", "produces": ["extractedEvents"]},
            "checkConsistency",
            42
        ]}))
        .unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].target, "draftContent");
        assert_eq!(steps[1].target, "extractedEvents");
        assert_eq!(steps[2].skill, "checkConsistency");

        let bare = parse_steps(json!([{"skill": "loadContext"}])).unwrap();
        assert_eq!(bare[0].skill, "loadContext");

        assert!(parse_steps(json!({"answer": "no"})).is_err());
    }

    #[tokio::test]
    async fn test_satisfied_goal_skips_oracle() {
        let provider = ScriptedProvider::always("{}");
        let planner = planner(Some(provider.clone()));
        let store = StateStore::from_value(json!({"chapterPlan": {"beats": [1]}})).unwrap();

        let plan = planner
            .plan(IntentKind::PlanChapter, &store, "plan it")
            .await
            .unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.source, PlanSource::Satisfied);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_oracle_plan_is_repaired() {
        let provider = ScriptedProvider::always(
            r#"```json
{"steps": [{"skill": "writeDraft", "produces": "draftContent", "reason": "go"}]}
```"#,
        );
        let planner = planner(Some(provider.clone()));

        let plan = planner
            .plan(IntentKind::DraftChapter, &StateStore::new(), "draft ch 3")
            .await
            .unwrap();
        assert_eq!(plan.source, PlanSource::Oracle);
        assert_eq!(plan.skills(), vec!["loadContext"]);

        let prompt = &provider.requests()[0].user;
        assert!(prompt.contains("draft ch 3"));
        assert!(prompt.contains("Missing goal keys: draftContent"));
        assert!(prompt.contains("- worldRules: absent"));
    }

    #[tokio::test]
    async fn test_oracle_failure_uses_fallback() {
        let provider = ScriptedProvider::new(|_| Err(LLMError::Timeout));
        let planner = planner(Some(provider));

        let plan = planner
            .plan(IntentKind::WriteChapter, &StateStore::new(), "write")
            .await
            .unwrap();
        assert_eq!(plan.source, PlanSource::Fallback);
        assert_eq!(plan.skills(), vec!["loadContext", "planChapter"]);
    }

    #[tokio::test]
    async fn test_unusable_oracle_plan_uses_fallback() {
        let provider = ScriptedProvider::new(|_| {
            Ok(OracleReply::raw(r#"{"steps": [{"skill": "inventStory"}]}"#))
        });
        let planner = planner(Some(provider));

        let plan = planner
            .plan(IntentKind::WriteChapter, &StateStore::new(), "write")
            .await
            .unwrap();
        assert_eq!(plan.source, PlanSource::Fallback);
    }

    #[tokio::test]
    async fn test_fourth_proposal_dropped() {
        let provider = ScriptedProvider::always(r#"{"steps": [{"skill": "planChapter"}]}"#);
        let mut planner = planner(Some(provider));
        let store =
            StateStore::from_value(json!({"worldRules": [], "characters": [], "plotState": {}}))
                .unwrap();

        for _ in 0..3 {
            let plan = planner
                .plan(IntentKind::PlanChapter, &store, "")
                .await
                .unwrap();
            assert_eq!(plan.skills(), vec!["planChapter"]);
            planner.record_outcome("planChapter", false);
        }

        let result = planner.plan(IntentKind::PlanChapter, &store, "").await;
        match result {
            Err(EngineError::PlanningFailed(reason)) => assert_eq!(
                reason,
                "every producer of 'chapterPlan' (planChapter) reached the execution cap of 3"
            ),
            other => panic!("expected planning failure, got {:?}", other),
        }
        assert_eq!(planner.counts().runs("planChapter"), 3);

        planner.reset();
        assert_eq!(planner.counts().total(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_goal_fails() {
        let planner = planner(None);
        let result = planner
            .plan_for_goal(&["nowhere".to_string()], "custom", &StateStore::new(), "")
            .await;
        match result {
            Err(EngineError::PlanningFailed(reason)) => {
                assert_eq!(reason, "no skill produces 'nowhere'")
            }
            other => panic!("expected planning failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_capped_dependency_is_named() {
        let mut planner = planner(None);
        let store = StateStore::from_value(json!({
            "worldRules": [], "characters": [], "plotState": {},
            "chapterPlan": {"beats": ["a"]},
            "draftContent": "draft"
        }))
        .unwrap();
        for _ in 0..3 {
            planner.record_outcome("extractEvents", false);
        }

        let result = planner.plan(IntentKind::WriteChapter, &store, "").await;
        let Err(EngineError::PlanningFailed(reason)) = result else {
            panic!("expected planning failure");
        };
        assert!(reason.starts_with("'checkConsistency' cannot run"));
        assert!(reason.contains("every producer of 'extractedEvents' (extractEvents)"));
        assert!(!reason.contains("cycle"));
    }

    #[test]
    fn test_settings_from_config() {
        let config = PlannerConfig {
            max_plan_steps: 0,
            finalize_skill: String::new(),
            ..PlannerConfig::default()
        };
        let settings = PlannerSettings::from(&config);
        assert_eq!(settings.max_plan_steps, 1);
        assert!(settings.finalize_skill.is_none());
    }
}
