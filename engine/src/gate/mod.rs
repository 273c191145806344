//! Consistency Gate
//!
//! Four fixed stages over one candidate text:
//!
//! 1. **Text**: surface check (viewpoint, formatting, local logic)
//! 2. **State**: CHARACTER rules and WORLD rules of subtype `state`, judged
//!    against extracted events and state transitions
//! 3. **Contract**: INTENT rules, only when a writing intent is supplied
//! 4. **Progress**: ARC rules
//!
//! Every stage runs regardless of what earlier stages found. A stage that
//! errors is logged and contributes no violations. The merged result decides
//! whether commit actions may run.

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;

pub mod merge;
pub mod rewrite;
pub mod text_layer;

pub use merge::GateStatus;
pub use rewrite::{Drafter, RewriteLoop, RewriteOutcome};
pub use text_layer::TextLayer;

use crate::context::{EventExtractor, ExtractedEvents, NarrativeContext, WritingIntent};
use crate::rules::{EvaluationInput, RuleEngine, RuleFilter, Scope, Violation};

/// Gate pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStage {
    Text,
    State,
    Contract,
    Progress,
}

impl GateStage {
    pub const ORDER: [GateStage; 4] = [
        GateStage::Text,
        GateStage::State,
        GateStage::Contract,
        GateStage::Progress,
    ];
}

/// Outcome of one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: GateStage,
    /// False when the stage was skipped (no intent, text layer disabled)
    pub ran: bool,
    pub violations: Vec<Violation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageReport {
    fn failed(stage: GateStage, error: &EngineError) -> Self {
        tracing::warn!("Gate stage {:?} failed, counting no violations: {}", stage, error);
        Self {
            stage,
            ran: true,
            violations: Vec::new(),
            error: Some(error.to_string()),
        }
    }

    fn skipped(stage: GateStage) -> Self {
        Self {
            stage,
            ran: false,
            violations: Vec::new(),
            error: None,
        }
    }
}

/// Merged verdict of one gate pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateReport {
    pub status: GateStatus,
    pub score: u8,
    pub violations: Vec<Violation>,
    pub stages: Vec<StageReport>,
}

impl GateReport {
    /// Merge stage reports into a verdict
    pub fn from_stages(stages: Vec<StageReport>) -> Self {
        let violations = merge::merge(stages.iter().map(|s| s.violations.clone()));
        Self {
            status: merge::status(&violations),
            score: merge::score(&violations),
            violations,
            stages,
        }
    }

    pub fn is_pass(&self) -> bool {
        self.status == GateStatus::Pass
    }

    /// Number of ERROR and FATAL violations
    pub fn blocking_count(&self) -> usize {
        self.violations
            .iter()
            .filter(|v| v.severity.is_blocking())
            .count()
    }

    /// Stages that failed internally
    pub fn degraded_stages(&self) -> Vec<GateStage> {
        self.stages
            .iter()
            .filter(|s| s.error.is_some())
            .map(|s| s.stage)
            .collect()
    }

    /// Refuse commit actions while the gate fails
    pub fn ensure_commit_allowed(&self) -> Result<(), EngineError> {
        match self.status {
            GateStatus::Pass => Ok(()),
            GateStatus::Fail => Err(EngineError::CommitBlocked {
                violations: self.blocking_count(),
            }),
        }
    }

    /// One-line verdict
    pub fn summary(&self) -> String {
        format!(
            "{} (score {}, {} violations, {} blocking)",
            self.status,
            self.score,
            self.violations.len(),
            self.blocking_count()
        )
    }

    /// The `checkResults` value written into the state store
    pub fn to_check_results(&self) -> Value {
        json!({
            "overall": self.summary(),
            "status": self.status,
            "score": self.score,
            "violations": self.violations,
            "stages": self.stages,
        })
    }
}

/// Input to one gate pass
#[derive(Debug, Clone, Copy)]
pub struct GateInput<'a> {
    pub text: &'a str,
    pub context: &'a NarrativeContext,
    pub intent: Option<&'a WritingIntent>,
    /// Previously extracted events; the gate asks its extractor when absent
    pub events: Option<&'a ExtractedEvents>,
}

impl<'a> GateInput<'a> {
    pub fn new(text: &'a str, context: &'a NarrativeContext) -> Self {
        Self {
            text,
            context,
            intent: None,
            events: None,
        }
    }

    pub fn with_intent(mut self, intent: Option<&'a WritingIntent>) -> Self {
        self.intent = intent;
        self
    }

    pub fn with_events(mut self, events: Option<&'a ExtractedEvents>) -> Self {
        self.events = events;
        self
    }
}

/// The four-stage gate
pub struct ConsistencyGate {
    engine: Arc<RuleEngine>,
    text_layer: Option<TextLayer>,
    extractor: Option<Arc<dyn EventExtractor>>,
}

impl ConsistencyGate {
    pub fn new(engine: Arc<RuleEngine>) -> Self {
        Self {
            engine,
            text_layer: None,
            extractor: None,
        }
    }

    pub fn with_text_layer(mut self, text_layer: TextLayer) -> Self {
        self.text_layer = Some(text_layer);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn EventExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    /// Run all four stages and merge
    pub async fn check(&self, input: &GateInput<'_>) -> GateReport {
        self.check_with_events(input).await.0
    }

    /// Same as [`ConsistencyGate::check`], also returning the events the
    /// State stage judged. `None` when no events could be obtained.
    pub async fn check_with_events(
        &self,
        input: &GateInput<'_>,
    ) -> (GateReport, Option<ExtractedEvents>) {
        let mut stages = Vec::with_capacity(GateStage::ORDER.len());

        // 1. Text
        stages.push(match &self.text_layer {
            Some(layer) => {
                run_stage(GateStage::Text, async {
                    let found = layer.check(input.text).await?;
                    let surface = found.into_iter().filter(|v| v.kind.is_surface());
                    Ok::<Vec<Violation>, EngineError>(surface.collect())
                })
                .await
            }
            None => StageReport::skipped(GateStage::Text),
        });

        // 2. State
        let extracted = self.events_for(input).await;
        stages.push(match &extracted {
            Ok(events) => {
                run_stage(GateStage::State, async {
                    let eval = EvaluationInput::new(input.text, input.context, events)
                        .with_intent(input.intent);
                    let filter =
                        RuleFilter::scope(Scope::Character).or_subtype(Scope::World, "state");
                    let found = self.engine.evaluate(&eval, &filter).await;
                    Ok::<Vec<Violation>, EngineError>(found)
                })
                .await
            }
            Err(e) => StageReport::failed(GateStage::State, e),
        });

        let used = extracted.ok();
        let events = used.clone().unwrap_or_default();
        let eval =
            EvaluationInput::new(input.text, input.context, &events).with_intent(input.intent);

        // 3. Contract
        stages.push(match input.intent {
            Some(_) => {
                run_stage(GateStage::Contract, async {
                    let filter = RuleFilter::scope(Scope::Intent);
                    Ok::<Vec<Violation>, EngineError>(self.engine.evaluate(&eval, &filter).await)
                })
                .await
            }
            None => StageReport::skipped(GateStage::Contract),
        });

        // 4. Progress
        stages.push(
            run_stage(GateStage::Progress, async {
                let filter = RuleFilter::scope(Scope::Arc);
                Ok::<Vec<Violation>, EngineError>(self.engine.evaluate(&eval, &filter).await)
            })
            .await,
        );

        let report = GateReport::from_stages(stages);
        tracing::info!("Consistency gate: {}", report.summary());
        (report, used)
    }

    async fn events_for(&self, input: &GateInput<'_>) -> Result<ExtractedEvents, EngineError> {
        if let Some(events) = input.events {
            return Ok(events.clone());
        }
        match &self.extractor {
            Some(extractor) => extractor.extract(input.text, input.context).await,
            None => Err(EngineError::MissingInput {
                skill: "checkConsistency".to_string(),
                field: "extractedEvents".to_string(),
            }),
        }
    }
}

async fn run_stage<F>(stage: GateStage, work: F) -> StageReport
where
    F: Future<Output = Result<Vec<Violation>, EngineError>>,
{
    match work.await {
        Ok(violations) => {
            tracing::debug!("Gate stage {:?}: {} violations", stage, violations.len());
            StageReport {
                stage,
                ran: true,
                violations,
                error: None,
            }
        }
        Err(e) => StageReport::failed(stage, &e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::scripted::ScriptedProvider;
    use crate::llm::{LLMError, OracleClient, OracleReply};
    use crate::rules::tests::rule;
    use crate::rules::{RuleSet, Severity};

    fn gate(provider: ScriptedProvider) -> ConsistencyGate {
        let oracle = OracleClient::new(Arc::new(provider));
        let rules = RuleSet::new(vec![
            rule("c1", Scope::Character, Severity::Error),
            rule("i1", Scope::Intent, Severity::Error),
            rule("a1", Scope::Arc, Severity::Warn),
        ]);
        ConsistencyGate::new(Arc::new(RuleEngine::new(oracle.clone(), rules)))
            .with_text_layer(TextLayer::new(oracle))
    }

    #[tokio::test]
    async fn test_contract_stage_skipped_without_intent() {
        let provider = ScriptedProvider::new(|req| {
            if req.system.contains("proofread") {
                Ok(OracleReply::raw(r#"{"issues": []}"#))
            } else {
                Ok(OracleReply::raw(r#"{"violations": [{"rule_id": "a1"}]}"#))
            }
        });
        let context = NarrativeContext::empty();
        let events = ExtractedEvents::default();
        let input = GateInput::new("text", &context).with_events(Some(&events));

        let report = gate(provider).check(&input).await;
        assert_eq!(report.stages.len(), 4);
        assert!(!report.stages[2].ran);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.status, GateStatus::Pass);
        assert_eq!(report.score, 95);
        assert!(report.ensure_commit_allowed().is_ok());
    }

    #[tokio::test]
    async fn test_failing_stage_does_not_abort_pass() {
        let provider = ScriptedProvider::new(|req| {
            if req.system.contains("proofread") {
                Err(LLMError::Timeout)
            } else if req.user.contains("\"c1\"") {
                Ok(OracleReply::raw(r#"{"violations": [{"rule_id": "c1"}]}"#))
            } else {
                Ok(OracleReply::raw(r#"{"violations": []}"#))
            }
        });
        let context = NarrativeContext::empty();
        let events = ExtractedEvents::default();
        let intent = WritingIntent::new(vec!["goal".into()], vec![]);
        let input = GateInput::new("text", &context)
            .with_events(Some(&events))
            .with_intent(Some(&intent));

        let report = gate(provider).check(&input).await;
        assert_eq!(report.degraded_stages(), vec![GateStage::Text]);
        assert!(report.stages[2].ran);
        assert_eq!(report.status, GateStatus::Fail);
        assert_eq!(report.blocking_count(), 1);
        assert!(matches!(
            report.ensure_commit_allowed(),
            Err(EngineError::CommitBlocked { violations: 1 })
        ));
    }

    #[tokio::test]
    async fn test_state_stage_degrades_without_events() {
        let provider = ScriptedProvider::always(r#"{"violations": [], "issues": []}"#);
        let context = NarrativeContext::empty();
        let input = GateInput::new("text", &context);

        let report = gate(provider).check(&input).await;
        assert_eq!(report.degraded_stages(), vec![GateStage::State]);
        assert_eq!(report.status, GateStatus::Pass);
    }

    struct OneEvent;

    #[async_trait::async_trait]
    impl EventExtractor for OneEvent {
        async fn extract(
            &self,
            text: &str,
            _context: &NarrativeContext,
        ) -> Result<ExtractedEvents, EngineError> {
            Ok(ExtractedEvents {
                events: vec![json!({"summary": text})],
                state_transitions: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_check_reports_events_it_judged() {
        let provider = ScriptedProvider::always(r#"{"violations": [], "issues": []}"#);
        let context = NarrativeContext::empty();
        let input = GateInput::new("the lantern is lit", &context);

        let (report, events) = gate(provider.clone())
            .with_extractor(Arc::new(OneEvent))
            .check_with_events(&input)
            .await;
        assert!(report.degraded_stages().is_empty());
        assert_eq!(
            events.unwrap().events,
            vec![json!({"summary": "the lantern is lit"})]
        );

        let (_, events) = gate(provider).check_with_events(&input).await;
        assert!(events.is_none());
    }

    #[test]
    fn test_check_results_shape() {
        let report = GateReport::from_stages(vec![StageReport {
            stage: GateStage::Progress,
            ran: true,
            violations: vec![rule("a", Scope::Arc, Severity::Fatal).violation(None, None, vec![])],
            error: None,
        }]);
        let value = report.to_check_results();
        assert_eq!(value["status"], "FAIL");
        assert_eq!(value["score"], 80);
        assert!(value["overall"].as_str().unwrap().starts_with("FAIL"));
        assert_eq!(value["stages"][0]["stage"], "progress");
    }
}
