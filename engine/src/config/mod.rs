//! Configuration management
//!
//! This module handles loading, validation, and management of the Loom configuration.
//! Configuration is stored in TOML format at ~/.loom/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Workspace path, log level, data directory
//! - **llm**: Oracle provider settings, timeout and sampling defaults
//! - **planner**: Execution caps and plan-repair bounds
//! - **rules**: Baseline and workspace-override rule files
//! - **gate**: Rewrite budget and stage toggles
//!
//! # Examples
//!
//! ```no_run
//! use loom_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Workspace: {:?}", config.core.workspace);
//! println!("Per-skill cap: {}", config.planner.max_executions_per_skill);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Oracle calls one gate pass can make: text layer, event extraction and
/// the three rule-driven stages in batched mode
pub const ORACLE_CALLS_PER_GATE_PASS: u64 = 5;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    pub core: CoreConfig,

    /// Oracle provider configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Planner bounds
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Rule sources
    #[serde(default)]
    pub rules: RulesConfig,

    /// Consistency gate settings
    #[serde(default)]
    pub gate: GateConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Workspace directory where persisted chapters land (supports ~ expansion)
    pub workspace: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Oracle provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Default provider (ollama, openai)
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Per-call timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Sampling temperature for oracle calls (0.0-2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per oracle answer
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Ollama provider settings
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// OpenAI provider settings
    #[serde(default)]
    pub openai: OpenAIConfig,
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL for Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

/// OpenAI provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// Base URL for OpenAI API
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_openai_model")]
    pub model: String,
    // Note: API key read from OPENAI_API_KEY, not from config
}

/// Planner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Maximum executions of one skill within one task
    #[serde(default = "default_max_executions")]
    pub max_executions_per_skill: u32,

    /// Maximum steps returned by one planning call
    #[serde(default = "default_max_plan_steps")]
    pub max_plan_steps: usize,

    /// Maximum depth of prerequisite back-fill during repair and fallback
    #[serde(default = "default_max_repair_depth")]
    pub max_repair_depth: usize,

    /// Maximum plan/execute iterations per task
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Skill allowed to re-run after producing its output when its last
    /// attempt failed
    #[serde(default = "default_finalize_skill")]
    pub finalize_skill: String,

    /// Skills whose failure aborts the task
    #[serde(default = "default_critical_skills")]
    pub critical_skills: Vec<String>,

    /// Per-skill timeout in seconds
    #[serde(default = "default_skill_timeout_secs")]
    pub skill_timeout_secs: u64,
}

/// Rule source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Baseline rule file; the embedded catalogue is used when unset
    #[serde(default)]
    pub baseline: Option<PathBuf>,

    /// Workspace override rule file, appended after the baseline
    #[serde(default)]
    pub workspace_override: Option<PathBuf>,

    /// Evaluate all rules in one oracle call (falls back per rule on failure)
    #[serde(default = "default_true")]
    pub batched: bool,
}

/// Consistency gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Redraft attempts before a failing gate is terminal
    #[serde(default = "default_rewrite_budget")]
    pub rewrite_budget: usize,

    /// Run the surface-level text stage
    #[serde(default = "default_true")]
    pub text_layer: bool,

    /// Wall-time limit for one `checkConsistency` run, rewrites included.
    /// Derived from `rewrite_budget` and `llm.timeout_secs` when unset.
    #[serde(default)]
    pub check_timeout_secs: Option<u64>,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.loom")
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_executions() -> u32 {
    3
}

fn default_max_plan_steps() -> usize {
    2
}

fn default_max_repair_depth() -> usize {
    4
}

fn default_max_iterations() -> usize {
    24
}

fn default_finalize_skill() -> String {
    "finalizeChapter".to_string()
}

fn default_critical_skills() -> Vec<String> {
    vec!["finalizeChapter".to_string(), "persistChapter".to_string()]
}

fn default_skill_timeout_secs() -> u64 {
    300
}

fn default_rewrite_budget() -> usize {
    3
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            ollama: OllamaConfig::default(),
            openai: OpenAIConfig::default(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_executions_per_skill: default_max_executions(),
            max_plan_steps: default_max_plan_steps(),
            max_repair_depth: default_max_repair_depth(),
            max_iterations: default_max_iterations(),
            finalize_skill: default_finalize_skill(),
            critical_skills: default_critical_skills(),
            skill_timeout_secs: default_skill_timeout_secs(),
        }
    }
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            baseline: None,
            workspace_override: None,
            batched: true,
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            rewrite_budget: default_rewrite_budget(),
            text_layer: true,
            check_timeout_secs: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.loom/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default_config();
        config.validate_and_process()?;

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.loom/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".loom").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig {
                workspace: PathBuf::from("~/loom"),
                log_level: default_log_level(),
                data_dir: default_data_dir(),
            },
            llm: LLMConfig::default(),
            planner: PlannerConfig::default(),
            rules: RulesConfig::default(),
            gate: GateConfig::default(),
        }
    }

    /// Check value ranges without touching the file system
    pub fn validate(&self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_providers = ["ollama", "openai"];
        if !valid_providers.contains(&self.llm.default_provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid default provider '{}'. Must be one of: {}",
                self.llm.default_provider,
                valid_providers.join(", ")
            )));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(EngineError::Config(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.llm.timeout_secs == 0 {
            return Err(EngineError::Config(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.planner.max_executions_per_skill == 0 {
            return Err(EngineError::Config(
                "max_executions_per_skill must be greater than 0".to_string(),
            ));
        }

        if self.planner.max_plan_steps == 0 || self.planner.max_iterations == 0 {
            return Err(EngineError::Config(
                "max_plan_steps and max_iterations must be greater than 0".to_string(),
            ));
        }

        // A skill must outlive at least one oracle call
        if self.planner.skill_timeout_secs < self.llm.timeout_secs {
            return Err(EngineError::Config(format!(
                "skill_timeout_secs ({}) must be at least llm.timeout_secs ({})",
                self.planner.skill_timeout_secs, self.llm.timeout_secs
            )));
        }

        let one_pass = ORACLE_CALLS_PER_GATE_PASS * self.llm.timeout_secs;
        if let Some(secs) = self.gate.check_timeout_secs {
            if secs < one_pass {
                return Err(EngineError::Config(format!(
                    "check_timeout_secs ({}) must cover one gate pass ({}s)",
                    secs, one_pass
                )));
            }
        }

        Ok(())
    }

    /// Time `checkConsistency` may spend on its first check and every
    /// rewrite round: one gate pass per check plus one call per redraft.
    pub fn check_time_limit(&self) -> Duration {
        let secs = self.gate.check_timeout_secs.unwrap_or_else(|| {
            let budget = self.gate.rewrite_budget as u64;
            let calls = (budget + 1) * ORACLE_CALLS_PER_GATE_PASS + budget;
            calls * self.llm.timeout_secs
        });
        Duration::from_secs(secs)
    }

    /// Validate and process configuration
    ///
    /// Validates ranges, expands ~ in paths and creates the workspace and
    /// data directories when missing.
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        self.validate()?;

        self.core.workspace = expand_path(&self.core.workspace)?;
        self.core.workspace = canonicalize_or_create(&self.core.workspace)?;

        if !self.core.workspace.is_dir() {
            return Err(EngineError::Config(format!(
                "Workspace path is not a directory: {:?}",
                self.core.workspace
            )));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        if let Some(path) = &self.rules.baseline {
            self.rules.baseline = Some(expand_path(path)?);
        }
        if let Some(path) = &self.rules.workspace_override {
            self.rules.workspace_override = Some(expand_path(path)?);
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

/// Canonicalize path, creating it if it doesn't exist
fn canonicalize_or_create(path: &Path) -> Result<PathBuf, EngineError> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| {
            EngineError::Config(format!("Failed to create directory {:?}: {}", path, e))
        })?;
    }

    path.canonicalize()
        .map_err(|e| EngineError::Config(format!("Failed to canonicalize {:?}: {}", path, e)))
}
