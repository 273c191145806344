//! Example implementing a skill and invoking it directly
//!
//! The engine dispatches skills the same way: it fills a `SkillInput` from
//! the state store, calls `run`, and applies `state_updates` atomically.

use async_trait::async_trait;
use sdk::{EngineError, LoomErrorExt, Skill, SkillInput, SkillOptions, SkillOutput};
use serde_json::json;

/// Counts the words of a draft
struct WordCount;

#[async_trait]
impl Skill for WordCount {
    fn name(&self) -> &str {
        "wordCount"
    }

    fn description(&self) -> &str {
        "Count the words of the current draft"
    }

    fn required_inputs(&self) -> &[&'static str] {
        &["draftContent"]
    }

    async fn run(
        &self,
        input: SkillInput,
        _options: &SkillOptions,
    ) -> Result<SkillOutput, EngineError> {
        let draft = input
            .param_str("draftContent")
            .map_err(|e| EngineError::SkillFailed {
                skill: self.name().to_string(),
                reason: e.to_string(),
            })?;
        let words = draft.split_whitespace().count();
        Ok(SkillOutput::empty()
            .with_update("stats.words", json!(words))
            .with_summary(format!("{} words", words)))
    }
}

#[tokio::main]
async fn main() {
    let skill = WordCount;
    let options = SkillOptions::for_task("example");

    // Example 1: a well-formed invocation
    let input = SkillInput::new().with_param("draftContent", json!("The tide came in twice."));
    match skill.run(input, &options).await {
        Ok(output) => {
            println!("{}: {:?}", skill.name(), output.summary);
            for key in output.produced_keys() {
                println!("  writes {} = {}", key, output.state_updates[key]);
            }
        }
        Err(e) => println!("Error: {}", e),
    }

    // Example 2: a missing input field, reported with its user hint
    match skill.run(SkillInput::new(), &options).await {
        Ok(_) => println!("unexpected success"),
        Err(e) => {
            println!("Error: {}", e);
            println!("Hint: {}", e.user_hint());
            println!("Recoverable: {}", e.is_recoverable());
        }
    }
}
