//! Built-in chapter skills
//!
//! One `sdk::Skill` per entry of the default contract table. Oracle-backed
//! skills build their prompts through [`compose_prompt`] so every model sees
//! the request and the loaded context in the same layout.

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::{Skill, SkillInput, SkillOptions, SkillOutput};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::context::{
    ContextProvider, EventExtractor, ExtractedEvents, NarrativeContext, WritingIntent,
};
use crate::gate::{ConsistencyGate, Drafter, GateInput, GateReport, RewriteLoop, RewriteOutcome};
use crate::llm::{extract_json, OracleClient};

/// Prompt body shared by the oracle-backed skills
pub fn compose_prompt(input: &SkillInput, sections: &[(&str, String)]) -> String {
    let mut prompt = format!(
        "Request: {}\n",
        input.param_str_opt("request").unwrap_or_default()
    );

    let context = input.param_or_null("context");
    if !context.is_null() {
        prompt.push_str("\nNarrative context:\n");
        prompt.push_str(&serde_json::to_string_pretty(&context).unwrap_or_default());
        prompt.push('\n');
    }

    for (title, body) in sections {
        prompt.push_str(&format!("\n{}:\n{}\n", title, body));
    }
    prompt
}

fn failed(skill: &str, reason: impl ToString) -> EngineError {
    EngineError::SkillFailed {
        skill: skill.to_string(),
        reason: reason.to_string(),
    }
}

fn required_str<'a>(
    input: &'a SkillInput,
    skill: &str,
    key: &str,
) -> Result<&'a str, EngineError> {
    input.param_str(key).map_err(|e| failed(skill, e))
}

fn context_of(input: &SkillInput) -> NarrativeContext {
    serde_json::from_value(input.param_or_null("context"))
        .unwrap_or_else(|_| NarrativeContext::empty())
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    }
}

/// loadContext
pub struct LoadContext {
    provider: Arc<dyn ContextProvider>,
}

impl LoadContext {
    pub fn new(provider: Arc<dyn ContextProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Skill for LoadContext {
    fn name(&self) -> &str {
        "loadContext"
    }

    fn description(&self) -> &str {
        "Load world rules, the character roster and the current plot state"
    }

    async fn run(
        &self,
        _input: SkillInput,
        _options: &SkillOptions,
    ) -> Result<SkillOutput, EngineError> {
        let context = self.provider.load().await?;
        Ok(SkillOutput {
            state_updates: context.to_state_updates(),
            summary: Some("narrative context loaded".to_string()),
        })
    }
}

const PLAN_SYSTEM_PROMPT: &str = "You are a fiction editor outlining the next chapter.\n\
Respect the world rules and the characters' current state.\n\
Answer with a JSON object: {\"title\": string, \"beats\": [string], \"pov\": string}";

/// planChapter
pub struct PlanChapter {
    oracle: OracleClient,
}

impl PlanChapter {
    pub fn new(oracle: OracleClient) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl Skill for PlanChapter {
    fn name(&self) -> &str {
        "planChapter"
    }

    fn description(&self) -> &str {
        "Outline the chapter's beats from the loaded context and the request"
    }

    fn required_inputs(&self) -> &[&'static str] {
        &["request"]
    }

    async fn run(
        &self,
        input: SkillInput,
        _options: &SkillOptions,
    ) -> Result<SkillOutput, EngineError> {
        let prompt = compose_prompt(&input, &[]);
        let answer = self.oracle.ask_text(PLAN_SYSTEM_PROMPT, &prompt).await?;
        if answer.trim().is_empty() {
            return Err(failed(self.name(), "oracle returned an empty outline"));
        }

        // Keep prose outlines too; the drafter reads either form.
        let plan = match extract_json(&answer).into_value() {
            Some(value @ Value::Object(_)) => value,
            _ => json!({ "outline": answer.trim() }),
        };
        Ok(SkillOutput::empty().with_update("chapterPlan", plan))
    }
}

const DRAFT_SYSTEM_PROMPT: &str = "You are a novelist writing one chapter.\n\
Follow the chapter plan beat by beat. Stay consistent with the world rules and with \
what each character knows and where they are. Answer with the chapter text only.";

/// writeDraft
pub struct WriteDraft {
    oracle: OracleClient,
}

impl WriteDraft {
    pub fn new(oracle: OracleClient) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl Skill for WriteDraft {
    fn name(&self) -> &str {
        "writeDraft"
    }

    fn description(&self) -> &str {
        "Write the chapter draft following the chapter plan"
    }

    fn required_inputs(&self) -> &[&'static str] {
        &["chapterPlan"]
    }

    async fn run(
        &self,
        input: SkillInput,
        _options: &SkillOptions,
    ) -> Result<SkillOutput, EngineError> {
        let mut sections = vec![("Chapter plan", render(&input.param_or_null("chapterPlan")))];
        if let Some(intent) = WritingIntent::from_value(&input.param_or_null("writingIntent")) {
            sections.push(("Writing intent", render(&json!(intent))));
        }

        let prompt = compose_prompt(&input, &sections);
        let draft = self.oracle.ask_text(DRAFT_SYSTEM_PROMPT, &prompt).await?;
        let draft = draft.trim();
        if draft.is_empty() {
            return Err(failed(self.name(), "oracle returned an empty draft"));
        }

        Ok(SkillOutput::empty()
            .with_update("draftContent", json!(draft))
            .with_summary(format!("drafted {} chars", draft.len())))
    }
}

/// extractEvents
pub struct ExtractEvents {
    extractor: Arc<dyn EventExtractor>,
}

impl ExtractEvents {
    pub fn new(extractor: Arc<dyn EventExtractor>) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl Skill for ExtractEvents {
    fn name(&self) -> &str {
        "extractEvents"
    }

    fn description(&self) -> &str {
        "Extract events and character state transitions from the draft"
    }

    fn required_inputs(&self) -> &[&'static str] {
        &["draftContent"]
    }

    async fn run(
        &self,
        input: SkillInput,
        _options: &SkillOptions,
    ) -> Result<SkillOutput, EngineError> {
        let draft = required_str(&input, self.name(), "draftContent")?;
        let events = self.extractor.extract(draft, &context_of(&input)).await?;
        Ok(SkillOutput::empty()
            .with_update("extractedEvents", events.to_value())
            .with_summary(format!(
                "{} events, {} state transitions",
                events.events.len(),
                events.state_transitions.len()
            )))
    }
}

/// checkConsistency
///
/// Runs the gate and, when a drafter is attached, the bounded rewrite loop.
/// A revised draft replaces `draftContent` and the events extracted from it
/// replace `extractedEvents` (both declared as `revises` in the contract).
/// The final verdict is written to `checkResults` whether it passed or not.
///
/// With a time limit, rewriting stops at the limit and the last complete
/// verdict is still written. The skill asks the executor for the limit plus
/// [`CHECK_TIMEOUT_GRACE`], so its own deadline always fires first.
pub struct CheckConsistency {
    gate: Arc<ConsistencyGate>,
    drafter: Option<Arc<dyn Drafter>>,
    rewrite_budget: usize,
    time_limit: Option<Duration>,
}

/// Executor headroom past the check's own deadline
pub const CHECK_TIMEOUT_GRACE: Duration = Duration::from_secs(5);

impl CheckConsistency {
    pub fn new(gate: Arc<ConsistencyGate>) -> Self {
        Self {
            gate,
            drafter: None,
            rewrite_budget: 0,
            time_limit: None,
        }
    }

    pub fn with_rewrites(mut self, drafter: Arc<dyn Drafter>, budget: usize) -> Self {
        self.drafter = Some(drafter);
        self.rewrite_budget = budget;
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }
}

#[async_trait]
impl Skill for CheckConsistency {
    fn name(&self) -> &str {
        "checkConsistency"
    }

    fn description(&self) -> &str {
        "Run the four-stage consistency gate over the draft, revising it on failure"
    }

    fn required_inputs(&self) -> &[&'static str] {
        &["draftContent"]
    }

    fn timeout(&self) -> Option<Duration> {
        self.time_limit.map(|limit| limit + CHECK_TIMEOUT_GRACE)
    }

    async fn run(
        &self,
        input: SkillInput,
        _options: &SkillOptions,
    ) -> Result<SkillOutput, EngineError> {
        let deadline = self.time_limit.map(|limit| Instant::now() + limit);
        let draft = required_str(&input, self.name(), "draftContent")?.to_string();
        let context = context_of(&input);
        let intent = WritingIntent::from_value(&input.param_or_null("writingIntent"));
        let events = input
            .param_json("extractedEvents")
            .ok()
            .map(ExtractedEvents::from_value);

        let gate_input = GateInput::new(&draft, &context)
            .with_intent(intent.as_ref())
            .with_events(events.as_ref());
        let first = self.gate.check(&gate_input);
        let report = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, first)
                .await
                .map_err(|_| EngineError::SkillFailed {
                    skill: self.name().to_string(),
                    reason: "no verdict before the check time limit".to_string(),
                })?,
            None => first.await,
        };

        let Some(drafter) = self.drafter.as_deref().filter(|_| !report.is_pass()) else {
            return Ok(check_output(&report, None));
        };

        let mut rewrite = RewriteLoop::new(&self.gate, drafter, self.rewrite_budget);
        if let Some(deadline) = deadline {
            rewrite = rewrite.with_deadline(deadline);
        }
        let outcome = rewrite
            .continue_from(draft, report, &context, intent.as_ref())
            .await?;
        let (revised, report, attempts, events) = match outcome {
            RewriteOutcome::Passed {
                draft,
                report,
                attempts,
                events,
            } => (draft, report, attempts, events),
            RewriteOutcome::Exhausted {
                draft,
                last_report,
                attempts,
                events,
            } => (draft, last_report, attempts, events),
        };

        let mut output = check_output(&report, Some(attempts));
        if attempts > 0 {
            // Null clears events of the discarded draft so extractEvents reruns
            let events = events.map_or(Value::Null, |e| e.to_value());
            output = output
                .with_update("draftContent", json!(revised))
                .with_update("extractedEvents", events);
        }
        Ok(output)
    }
}

fn check_output(report: &GateReport, rewrites: Option<usize>) -> SkillOutput {
    let mut results = report.to_check_results();
    if let (Some(attempts), Value::Object(map)) = (rewrites, &mut results) {
        map.insert("rewrites".to_string(), json!(attempts));
    }
    SkillOutput::empty()
        .with_update("checkResults", results)
        .with_summary(report.summary())
}

/// finalizeChapter
pub struct FinalizeChapter;

#[async_trait]
impl Skill for FinalizeChapter {
    fn name(&self) -> &str {
        "finalizeChapter"
    }

    fn description(&self) -> &str {
        "Promote a draft that passed the consistency gate to final content"
    }

    fn required_inputs(&self) -> &[&'static str] {
        &["draftContent", "checkResults"]
    }

    async fn run(
        &self,
        input: SkillInput,
        _options: &SkillOptions,
    ) -> Result<SkillOutput, EngineError> {
        let results = input.param_or_null("checkResults");
        if results.get("status").and_then(Value::as_str) == Some("FAIL") {
            let blocking = results
                .get("violations")
                .and_then(Value::as_array)
                .map(|list| {
                    list.iter()
                        .filter(|v| {
                            matches!(
                                v.get("severity").and_then(Value::as_str),
                                Some("FATAL") | Some("ERROR")
                            )
                        })
                        .count()
                })
                .unwrap_or(0);
            return Err(EngineError::CommitBlocked {
                violations: blocking,
            });
        }

        let draft = required_str(&input, self.name(), "draftContent")?;
        Ok(SkillOutput::empty().with_update("finalContent", json!(draft)))
    }
}

/// persistChapter
pub struct PersistChapter {
    workspace: PathBuf,
}

impl PersistChapter {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }
}

#[async_trait]
impl Skill for PersistChapter {
    fn name(&self) -> &str {
        "persistChapter"
    }

    fn description(&self) -> &str {
        "Write the final chapter to the workspace"
    }

    fn required_inputs(&self) -> &[&'static str] {
        &["finalContent"]
    }

    async fn run(
        &self,
        input: SkillInput,
        options: &SkillOptions,
    ) -> Result<SkillOutput, EngineError> {
        let content = required_str(&input, self.name(), "finalContent")?;
        let file_name = if options.task_id.is_empty() {
            "chapter.md".to_string()
        } else {
            format!("chapter-{}.md", options.task_id)
        };
        let path = self.workspace.join(file_name);

        tokio::fs::create_dir_all(&self.workspace).await?;
        tokio::fs::write(&path, content).await?;
        tracing::info!("Persisted chapter to {}", path.display());

        Ok(SkillOutput::empty().with_update(
            "persisted",
            json!({"path": path.display().to_string(), "bytes": content.len()}),
        ))
    }
}

const SUMMARY_SYSTEM_PROMPT: &str = "Summarize the chapter in at most five sentences. \
Name every character whose situation changed and how. Answer with the summary only.";

/// summarizeChapter
pub struct SummarizeChapter {
    oracle: OracleClient,
}

impl SummarizeChapter {
    pub fn new(oracle: OracleClient) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl Skill for SummarizeChapter {
    fn name(&self) -> &str {
        "summarizeChapter"
    }

    fn description(&self) -> &str {
        "Summarize the final chapter for later planning"
    }

    fn required_inputs(&self) -> &[&'static str] {
        &["finalContent"]
    }

    async fn run(
        &self,
        input: SkillInput,
        _options: &SkillOptions,
    ) -> Result<SkillOutput, EngineError> {
        let chapter = required_str(&input, self.name(), "finalContent")?;
        let prompt = compose_prompt(&input, &[("Chapter", chapter.to_string())]);
        let summary = self.oracle.ask_text(SUMMARY_SYSTEM_PROMPT, &prompt).await?;
        if summary.trim().is_empty() {
            return Err(failed(self.name(), "oracle returned an empty summary"));
        }
        Ok(SkillOutput::empty().with_update("chapterSummary", json!(summary.trim())))
    }
}

const REDRAFT_SYSTEM_PROMPT: &str = "You are revising a chapter draft that failed a consistency review.\n\
Fix every listed violation while keeping the rest of the chapter intact. \
Answer with the full revised chapter text only.";

/// Redrafts through the oracle using the gate's violations as feedback
pub struct OracleDrafter {
    oracle: OracleClient,
}

impl OracleDrafter {
    pub fn new(oracle: OracleClient) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl Drafter for OracleDrafter {
    async fn redraft(
        &self,
        draft: &str,
        report: &GateReport,
        attempt: usize,
    ) -> Result<String, EngineError> {
        let feedback: Vec<String> = report
            .violations
            .iter()
            .map(|v| {
                let mut line = format!("- [{}] {}: {}", v.severity.as_str(), v.rule_id, v.message);
                if !v.suggestion.is_empty() {
                    line.push_str(&format!(" (suggestion: {})", v.suggestion));
                }
                line
            })
            .collect();

        let user = format!(
            "Revision {}.\n\nViolations:\n{}\n\nDraft:\n{}",
            attempt,
            feedback.join("\n"),
            draft
        );
        let revised = self.oracle.ask_text(REDRAFT_SYSTEM_PROMPT, &user).await?;
        let revised = revised.trim();
        if revised.is_empty() {
            return Err(failed("checkConsistency", "oracle returned an empty revision"));
        }
        Ok(revised.to_string())
    }
}
