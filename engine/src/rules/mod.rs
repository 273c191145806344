//! Rule DSL
//!
//! Declarative consistency rules partitioned by scope, the violation shape
//! every check produces, and the single label table that maps the free-form
//! severity and scope strings found in rule files and oracle answers.
//!
//! Labels are mapped only at the I/O boundary (rule loading, answer
//! normalisation); everything inside the engine works on [`Severity`] and
//! [`Scope`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub mod engine;
pub mod loader;
pub mod scopes;

pub use engine::{EvaluationInput, RuleEngine};
pub use loader::{load_rule_set, parse_rules, RuleFormat};

/// Violation severity, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Fatal,
    Error,
    Warn,
    Low,
}

/// Accepted spellings, matched case-insensitively
const SEVERITY_LABELS: &[(&str, Severity)] = &[
    ("fatal", Severity::Fatal),
    ("critical", Severity::Fatal),
    ("blocker", Severity::Fatal),
    ("error", Severity::Error),
    ("major", Severity::Error),
    ("high", Severity::Error),
    ("warn", Severity::Warn),
    ("warning", Severity::Warn),
    ("minor", Severity::Warn),
    ("medium", Severity::Warn),
    ("low", Severity::Low),
    ("info", Severity::Low),
    ("hint", Severity::Low),
];

impl Severity {
    /// Map a label from a rule file or an oracle answer
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_lowercase();
        SEVERITY_LABELS
            .iter()
            .find(|(name, _)| *name == label)
            .map(|(_, severity)| *severity)
    }

    /// Sort rank: FATAL=0, ERROR=1, WARN=2, low=3
    pub fn rank(self) -> u8 {
        match self {
            Self::Fatal => 0,
            Self::Error => 1,
            Self::Warn => 2,
            Self::Low => 3,
        }
    }

    /// Points subtracted from the gate score
    pub fn penalty(self) -> u8 {
        match self {
            Self::Fatal => 20,
            Self::Error => 10,
            Self::Warn => 5,
            Self::Low => 2,
        }
    }

    /// FATAL and ERROR block a commit
    pub fn is_blocking(self) -> bool {
        matches!(self, Self::Fatal | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fatal => "FATAL",
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Low => "LOW",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Self::from_label(&label)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown severity '{}'", label)))
    }
}

/// Rule scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    World,
    Character,
    History,
    Intent,
    Arc,
}

impl Scope {
    pub const ALL: [Scope; 5] = [
        Scope::World,
        Scope::Character,
        Scope::History,
        Scope::Intent,
        Scope::Arc,
    ];

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "WORLD" => Some(Self::World),
            "CHARACTER" => Some(Self::Character),
            "HISTORY" => Some(Self::History),
            "INTENT" => Some(Self::Intent),
            "ARC" => Some(Self::Arc),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::World => "WORLD",
            Self::Character => "CHARACTER",
            Self::History => "HISTORY",
            Self::Intent => "INTENT",
            Self::Arc => "ARC",
        }
    }

    /// Violation kind reported for rules of this scope
    pub fn kind(self) -> ViolationKind {
        match self {
            Self::World => ViolationKind::World,
            Self::Character => ViolationKind::Character,
            Self::History => ViolationKind::History,
            Self::Intent => ViolationKind::Intent,
            Self::Arc => ViolationKind::Arc,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Scope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Scope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Self::from_label(&label)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown scope '{}'", label)))
    }
}

/// Category of a violation. Rule-engine violations take their scope's kind;
/// the text layer reports surface categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationKind {
    World,
    Character,
    History,
    Intent,
    Arc,
    Pov,
    Format,
    Logic,
}

impl ViolationKind {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "world" => Some(Self::World),
            "character" => Some(Self::Character),
            "history" => Some(Self::History),
            "intent" => Some(Self::Intent),
            "arc" => Some(Self::Arc),
            "pov" | "viewpoint" => Some(Self::Pov),
            "format" | "formatting" => Some(Self::Format),
            "logic" => Some(Self::Logic),
            _ => None,
        }
    }

    /// Surface categories checked by the text layer
    pub fn is_surface(self) -> bool {
        matches!(self, Self::Pov | Self::Format | Self::Logic)
    }
}

/// One declarative rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule {
    pub id: String,
    pub scope: Scope,
    /// Narrower category inside a scope; WORLD rules with subtype `state`
    /// are evaluated by the gate's state layer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    pub level: Severity,
    pub assertion: String,
    pub message: String,
    pub suggestion: String,
    pub enabled: bool,
}

impl Rule {
    /// Violation of this rule with the given findings
    pub fn violation(
        &self,
        evidence: Option<String>,
        location: Option<String>,
        entities: Vec<String>,
    ) -> Violation {
        Violation {
            rule_id: self.id.clone(),
            kind: self.scope.kind(),
            scope: Some(self.scope),
            severity: self.level,
            message: self.message.clone(),
            suggestion: self.suggestion.clone(),
            evidence: evidence.filter(|e| !e.trim().is_empty()),
            location: location.filter(|l| !l.trim().is_empty()),
            entities,
        }
    }
}

/// A finding that content breaks a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: String,
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    #[serde(default)]
    pub scope: Option<Scope>,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub suggestion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<String>,
}

impl Violation {
    /// Key used for deduplication: message text, rule id when blank
    pub fn dedupe_key(&self) -> &str {
        if self.message.trim().is_empty() {
            &self.rule_id
        } else {
            &self.message
        }
    }
}

/// Any FATAL violation
pub fn has_fatal_error(violations: &[Violation]) -> bool {
    violations.iter().any(|v| v.severity == Severity::Fatal)
}

/// Any FATAL or ERROR violation
pub fn has_error(violations: &[Violation]) -> bool {
    violations.iter().any(|v| v.severity.is_blocking())
}

/// Selects the rules one evaluation pass covers.
///
/// A rule matches when any clause matches: the scope is equal and, if the
/// clause names a subtype, the rule carries that subtype.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleFilter {
    clauses: Vec<(Scope, Option<String>)>,
    all: bool,
}

impl RuleFilter {
    pub fn all() -> Self {
        Self {
            clauses: Vec::new(),
            all: true,
        }
    }

    pub fn scope(scope: Scope) -> Self {
        Self {
            clauses: vec![(scope, None)],
            all: false,
        }
    }

    pub fn or_scope(mut self, scope: Scope) -> Self {
        self.clauses.push((scope, None));
        self
    }

    pub fn or_subtype(mut self, scope: Scope, subtype: impl Into<String>) -> Self {
        self.clauses.push((scope, Some(subtype.into())));
        self
    }

    pub fn matches(&self, rule: &Rule) -> bool {
        self.all
            || self.clauses.iter().any(|(scope, subtype)| {
                *scope == rule.scope
                    && subtype
                        .as_deref()
                        .map_or(true, |wanted| rule.subtype.as_deref() == Some(wanted))
            })
    }
}

/// Merged, enabled-only rule catalogue
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Keep enabled rules, in the given order
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules: rules.into_iter().filter(|r| r.enabled).collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule with the given id
    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn select(&self, filter: &RuleFilter) -> Vec<&Rule> {
        self.rules.iter().filter(|r| filter.matches(r)).collect()
    }

    pub fn count_by_scope(&self, scope: Scope) -> usize {
        self.rules.iter().filter(|r| r.scope == scope).count()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn rule(id: &str, scope: Scope, level: Severity) -> Rule {
        Rule {
            id: id.to_string(),
            scope,
            subtype: None,
            level,
            assertion: format!("assertion for {}", id),
            message: format!("message for {}", id),
            suggestion: format!("fix {}", id),
            enabled: true,
        }
    }

    #[test]
    fn test_severity_label_table() {
        assert_eq!(Severity::from_label("FATAL"), Some(Severity::Fatal));
        assert_eq!(Severity::from_label("critical"), Some(Severity::Fatal));
        assert_eq!(Severity::from_label("Blocker"), Some(Severity::Fatal));
        assert_eq!(Severity::from_label("major"), Some(Severity::Error));
        assert_eq!(Severity::from_label("high"), Some(Severity::Error));
        assert_eq!(Severity::from_label("warning"), Some(Severity::Warn));
        assert_eq!(Severity::from_label("medium"), Some(Severity::Warn));
        assert_eq!(Severity::from_label("info"), Some(Severity::Low));
        assert_eq!(Severity::from_label("severe"), None);
    }

    #[test]
    fn test_severity_order_and_penalty() {
        assert!(Severity::Fatal < Severity::Error);
        assert!(Severity::Warn < Severity::Low);
        assert_eq!(Severity::Fatal.rank(), 0);
        assert_eq!(Severity::Low.rank(), 3);
        assert_eq!(Severity::Error.penalty(), 10);
        assert!(!Severity::Warn.is_blocking());
    }

    #[test]
    fn test_scope_labels() {
        assert_eq!(Scope::from_label("world"), Some(Scope::World));
        assert_eq!(Scope::from_label(" ARC "), Some(Scope::Arc));
        assert_eq!(Scope::from_label("plot"), None);
        assert_eq!(Scope::Character.kind(), ViolationKind::Character);
    }

    #[test]
    fn test_violation_serializes_canonical_labels() {
        let v = rule("w1", Scope::World, Severity::Fatal).violation(None, None, vec![]);
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["severity"], "FATAL");
        assert_eq!(json["scope"], "WORLD");
        assert_eq!(json["type"], "world");

        let back: Violation = serde_json::from_value(json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_derived_predicates() {
        let warn = rule("a", Scope::Arc, Severity::Warn).violation(None, None, vec![]);
        let error = rule("b", Scope::Arc, Severity::Error).violation(None, None, vec![]);
        let fatal = rule("c", Scope::Arc, Severity::Fatal).violation(None, None, vec![]);

        assert!(!has_error(std::slice::from_ref(&warn)));
        assert!(has_error(&[warn.clone(), error.clone()]));
        assert!(!has_fatal_error(&[warn, error]));
        assert!(has_fatal_error(&[fatal]));
    }

    #[test]
    fn test_filter_with_subtype() {
        let mut world_state = rule("ws", Scope::World, Severity::Error);
        world_state.subtype = Some("state".to_string());
        let world_lore = rule("wl", Scope::World, Severity::Error);
        let character = rule("c", Scope::Character, Severity::Error);
        let arc = rule("a", Scope::Arc, Severity::Warn);

        let filter = RuleFilter::scope(Scope::Character).or_subtype(Scope::World, "state");
        assert!(filter.matches(&world_state));
        assert!(filter.matches(&character));
        assert!(!filter.matches(&world_lore));
        assert!(!filter.matches(&arc));
        assert!(RuleFilter::all().matches(&arc));
    }

    #[test]
    fn test_rule_set_drops_disabled() {
        let mut off = rule("off", Scope::History, Severity::Warn);
        off.enabled = false;
        let set = RuleSet::new(vec![rule("on", Scope::History, Severity::Warn), off]);
        assert_eq!(set.len(), 1);
        assert!(set.get("off").is_none());
        assert_eq!(set.count_by_scope(Scope::History), 1);
    }
}
