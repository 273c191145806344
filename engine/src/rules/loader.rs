//! Rule sources
//!
//! Rules come from a baseline catalogue (a configured file, or the one
//! embedded in the binary) plus an optional workspace override file. Both
//! are parsed into [`Rule`]s, concatenated baseline first, and filtered by
//! `enabled`.

use sdk::errors::EngineError;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use super::{Rule, RuleSet, Scope, Severity};
use crate::config::RulesConfig;

/// Baseline catalogue compiled into the engine
pub const EMBEDDED_BASELINE: &str = include_str!("baseline_rules.toml");

/// Rule file encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleFormat {
    Toml,
    Json,
}

impl RuleFormat {
    /// Pick the format from a file extension (`.json` or TOML otherwise)
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Toml,
        }
    }
}

/// Rule as written in a file, before label mapping
#[derive(Debug, Deserialize)]
struct RawRule {
    id: String,
    scope: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(alias = "severity")]
    level: String,
    assertion: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    suggestion: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<RawRule>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonRuleFile {
    List(Vec<RawRule>),
    Wrapped(RuleFile),
}

impl RawRule {
    fn into_rule(self) -> Result<Rule, EngineError> {
        let scope = Scope::from_label(&self.scope).ok_or_else(|| {
            EngineError::RuleLoad(format!("rule '{}': unknown scope '{}'", self.id, self.scope))
        })?;
        let level = Severity::from_label(&self.level).ok_or_else(|| {
            EngineError::RuleLoad(format!("rule '{}': unknown level '{}'", self.id, self.level))
        })?;
        if self.id.trim().is_empty() {
            return Err(EngineError::RuleLoad("rule with empty id".to_string()));
        }

        // A rule without its own message reports its assertion
        let message = if self.message.trim().is_empty() {
            self.assertion.clone()
        } else {
            self.message
        };

        Ok(Rule {
            id: self.id,
            scope,
            subtype: self.subtype.map(|s| s.to_ascii_lowercase()),
            level,
            assertion: self.assertion,
            message,
            suggestion: self.suggestion,
            enabled: self.enabled,
        })
    }
}

/// Parse one rule document
pub fn parse_rules(contents: &str, format: RuleFormat) -> Result<Vec<Rule>, EngineError> {
    let raw = match format {
        RuleFormat::Toml => {
            let file: RuleFile = toml::from_str(contents)
                .map_err(|e| EngineError::RuleLoad(format!("invalid TOML rule file: {}", e)))?;
            file.rules
        }
        RuleFormat::Json => {
            let file: JsonRuleFile = serde_json::from_str(contents)
                .map_err(|e| EngineError::RuleLoad(format!("invalid JSON rule file: {}", e)))?;
            match file {
                JsonRuleFile::List(rules) => rules,
                JsonRuleFile::Wrapped(file) => file.rules,
            }
        }
    };

    raw.into_iter().map(RawRule::into_rule).collect()
}

/// Read and parse a rule file, format chosen by extension
pub fn load_rule_file(path: &Path) -> Result<Vec<Rule>, EngineError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        EngineError::RuleLoad(format!("cannot read {}: {}", path.display(), e))
    })?;
    parse_rules(&contents, RuleFormat::from_path(path))
}

/// The embedded baseline catalogue
pub fn embedded_baseline() -> Result<Vec<Rule>, EngineError> {
    parse_rules(EMBEDDED_BASELINE, RuleFormat::Toml)
}

/// Concatenate baseline and override rules and drop disabled ones.
///
/// Duplicate ids are kept; the override entry follows the baseline entry.
pub fn merge_sources(baseline: Vec<Rule>, overrides: Vec<Rule>) -> RuleSet {
    let mut seen = HashSet::new();
    for rule in &baseline {
        seen.insert(rule.id.clone());
    }
    for rule in &overrides {
        if seen.contains(&rule.id) {
            tracing::warn!("Rule '{}' is defined in both baseline and override", rule.id);
        }
    }

    let mut rules = baseline;
    rules.extend(overrides);
    RuleSet::new(rules)
}

/// Load the merged rule set described by `[rules]`
pub fn load_rule_set(config: &RulesConfig) -> Result<RuleSet, EngineError> {
    let baseline = match &config.baseline {
        Some(path) => load_rule_file(path)?,
        None => embedded_baseline()?,
    };

    let overrides = match &config.workspace_override {
        Some(path) if path.exists() => load_rule_file(path)?,
        Some(path) => {
            tracing::warn!(
                "Workspace rule override {} does not exist, using baseline only",
                path.display()
            );
            Vec::new()
        }
        None => Vec::new(),
    };

    let set = merge_sources(baseline, overrides);
    tracing::debug!("Loaded {} enabled rules", set.len());
    Ok(set)
}
