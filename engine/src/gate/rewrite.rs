//! Bounded rewrite loop
//!
//! Runs the gate over a draft and, while it fails, asks a [`Drafter`] for a
//! revised draft. After `budget` redrafts a still-failing gate is terminal.
//! With a deadline, a rewrite round that would run past it is abandoned and
//! the loop ends on the last complete verdict.

use async_trait::async_trait;
use sdk::errors::EngineError;
use tokio::time::Instant;

use super::{ConsistencyGate, GateInput, GateReport};
use crate::context::{ExtractedEvents, NarrativeContext, WritingIntent};

/// Produces a revised draft from the last gate verdict
#[async_trait]
pub trait Drafter: Send + Sync {
    async fn redraft(
        &self,
        draft: &str,
        report: &GateReport,
        attempt: usize,
    ) -> Result<String, EngineError>;
}

/// Result of a rewrite loop
#[derive(Debug, Clone, PartialEq)]
pub enum RewriteOutcome {
    Passed {
        draft: String,
        report: GateReport,
        /// Redrafts performed before the gate passed
        attempts: usize,
        /// Events judged by the last check of a redrafted text
        events: Option<ExtractedEvents>,
    },
    Exhausted {
        draft: String,
        last_report: GateReport,
        attempts: usize,
        events: Option<ExtractedEvents>,
    },
}

impl RewriteOutcome {
    /// The latest verdict, passing or not
    pub fn report(&self) -> &GateReport {
        match self {
            Self::Passed { report, .. } => report,
            Self::Exhausted { last_report, .. } => last_report,
        }
    }

    /// Events extracted from the final draft. `None` when no redraft
    /// happened or the gate could not obtain events for the last one.
    pub fn events(&self) -> Option<&ExtractedEvents> {
        match self {
            Self::Passed { events, .. } | Self::Exhausted { events, .. } => events.as_ref(),
        }
    }

    /// Map exhaustion to `EngineError::GateExhausted`
    pub fn into_result(self) -> Result<(String, GateReport), EngineError> {
        match self {
            Self::Passed { draft, report, .. } => Ok((draft, report)),
            Self::Exhausted {
                attempts,
                last_report,
                ..
            } => Err(EngineError::GateExhausted {
                attempts,
                score: last_report.score,
            }),
        }
    }
}

pub struct RewriteLoop<'a> {
    gate: &'a ConsistencyGate,
    drafter: &'a dyn Drafter,
    budget: usize,
    deadline: Option<Instant>,
}

impl<'a> RewriteLoop<'a> {
    pub fn new(gate: &'a ConsistencyGate, drafter: &'a dyn Drafter, budget: usize) -> Self {
        Self {
            gate,
            drafter,
            budget,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Check, redraft on failure, repeat. A drafter error ends the loop.
    pub async fn run(
        &self,
        initial_draft: String,
        context: &NarrativeContext,
        intent: Option<&WritingIntent>,
    ) -> Result<RewriteOutcome, EngineError> {
        let input = GateInput::new(&initial_draft, context).with_intent(intent);
        let report = self.gate.check(&input).await;
        self.continue_from(initial_draft, report, context, intent).await
    }

    /// Same as [`RewriteLoop::run`] when the draft has already been checked
    /// once and `report` is that verdict.
    pub async fn continue_from(
        &self,
        draft: String,
        report: GateReport,
        context: &NarrativeContext,
        intent: Option<&WritingIntent>,
    ) -> Result<RewriteOutcome, EngineError> {
        let mut draft = draft;
        let mut report = report;
        let mut events = None;
        let mut attempts = 0;

        loop {
            if report.is_pass() {
                return Ok(RewriteOutcome::Passed {
                    draft,
                    report,
                    attempts,
                    events,
                });
            }
            let out_of_time = self.deadline.is_some_and(|d| Instant::now() >= d);
            if attempts >= self.budget || out_of_time {
                tracing::warn!(
                    "Gate still failing after {} rewrites: {}",
                    attempts,
                    report.summary()
                );
                return Ok(RewriteOutcome::Exhausted {
                    draft,
                    last_report: report,
                    attempts,
                    events,
                });
            }

            let attempt = attempts + 1;
            tracing::info!("Gate failed, requesting rewrite {}/{}", attempt, self.budget);
            let round = async {
                let revised = self.drafter.redraft(&draft, &report, attempt).await?;
                // Events from the previous text no longer describe this one
                let input = GateInput::new(&revised, context).with_intent(intent);
                let (verdict, judged) = self.gate.check_with_events(&input).await;
                Ok::<_, EngineError>((revised, verdict, judged))
            };
            let finished = match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, round).await.ok(),
                None => Some(round.await),
            };

            let Some(finished) = finished else {
                tracing::warn!(
                    "Rewrite {} ran past the deadline, keeping the last verdict: {}",
                    attempt,
                    report.summary()
                );
                return Ok(RewriteOutcome::Exhausted {
                    draft,
                    last_report: report,
                    attempts,
                    events,
                });
            };
            (draft, report, events) = finished?;
            attempts = attempt;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExtractedEvents;
    use crate::gate::GateStatus;
    use crate::llm::scripted::ScriptedProvider;
    use crate::llm::{OracleClient, OracleReply};
    use crate::rules::tests::rule;
    use crate::rules::{RuleEngine, RuleSet, Scope, Severity};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// One event per text, naming the text it came from
    struct EchoExtractor;

    #[async_trait]
    impl crate::context::EventExtractor for EchoExtractor {
        async fn extract(
            &self,
            text: &str,
            _context: &NarrativeContext,
        ) -> Result<ExtractedEvents, EngineError> {
            Ok(ExtractedEvents {
                events: vec![serde_json::json!({"summary": text})],
                state_transitions: Vec::new(),
            })
        }
    }

    struct CountingDrafter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Drafter for CountingDrafter {
        async fn redraft(
            &self,
            _draft: &str,
            _report: &GateReport,
            attempt: usize,
        ) -> Result<String, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("draft v{}", attempt + 1))
        }
    }

    /// Gate whose single ARC rule fails until the draft mentions `fixed_at`
    fn gate(fixed_at: &'static str) -> ConsistencyGate {
        let provider = ScriptedProvider::new(move |req| {
            if req.user.contains(fixed_at) {
                Ok(OracleReply::raw(r#"{"violations": []}"#))
            } else {
                Ok(OracleReply::raw(r#"{"violations": [{"rule_id": "a1"}]}"#))
            }
        });
        let rules = RuleSet::new(vec![rule("a1", Scope::Arc, Severity::Error)]);
        let engine = RuleEngine::new(OracleClient::new(Arc::new(provider)), rules);
        ConsistencyGate::new(Arc::new(engine)).with_extractor(Arc::new(EchoExtractor))
    }

    #[tokio::test]
    async fn test_passes_after_rewrite() {
        let gate = gate("draft v3");
        let drafter = CountingDrafter {
            calls: AtomicUsize::new(0),
        };
        let context = NarrativeContext::empty();

        let outcome = RewriteLoop::new(&gate, &drafter, 3)
            .run("draft v1".into(), &context, None)
            .await
            .unwrap();
        assert!(matches!(outcome, RewriteOutcome::Passed { attempts: 2, .. }));
        assert_eq!(drafter.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            outcome.events().unwrap().events,
            vec![serde_json::json!({"summary": "draft v3"})]
        );
        assert!(outcome.into_result().is_ok());
    }

    #[tokio::test]
    async fn test_first_pass_reports_no_fresh_events() {
        let gate = gate("draft v1");
        let drafter = CountingDrafter {
            calls: AtomicUsize::new(0),
        };
        let context = NarrativeContext::empty();

        let outcome = RewriteLoop::new(&gate, &drafter, 3)
            .run("draft v1".into(), &context, None)
            .await
            .unwrap();
        assert!(matches!(outcome, RewriteOutcome::Passed { attempts: 0, .. }));
        assert!(outcome.events().is_none());
    }

    /// Takes longer than any deadline the tests set
    struct SlowDrafter;

    #[async_trait]
    impl Drafter for SlowDrafter {
        async fn redraft(
            &self,
            _draft: &str,
            _report: &GateReport,
            _attempt: usize,
        ) -> Result<String, EngineError> {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            Ok("too late".to_string())
        }
    }

    #[tokio::test]
    async fn test_deadline_keeps_last_verdict() {
        let gate = gate("never");
        let context = NarrativeContext::empty();
        let deadline = Instant::now() + std::time::Duration::from_millis(50);

        let outcome = RewriteLoop::new(&gate, &SlowDrafter, 3)
            .with_deadline(deadline)
            .run("draft v1".into(), &context, None)
            .await
            .unwrap();
        match outcome {
            RewriteOutcome::Exhausted {
                draft,
                last_report,
                attempts,
                events,
            } => {
                assert_eq!(draft, "draft v1");
                assert_eq!(attempts, 0);
                assert_eq!(last_report.status, GateStatus::Fail);
                assert_eq!(last_report.violations[0].rule_id, "a1");
                assert!(events.is_none());
            }
            other => panic!("Expected Exhausted, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exhausted_budget_is_terminal() {
        let gate = gate("never");
        let drafter = CountingDrafter {
            calls: AtomicUsize::new(0),
        };
        let context = NarrativeContext::empty();

        let outcome = RewriteLoop::new(&gate, &drafter, 2)
            .run("draft v1".into(), &context, None)
            .await
            .unwrap();
        assert_eq!(outcome.report().status, GateStatus::Fail);
        assert_eq!(drafter.calls.load(Ordering::SeqCst), 2);
        assert!(matches!(
            outcome.into_result(),
            Err(EngineError::GateExhausted { attempts: 2, score: 90 })
        ));
    }
}
