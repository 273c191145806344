//! CLI interface for Loom
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Loom narrative task engine
///
/// Plans, drafts and checks chapters by replanning toward a goal state after
/// every executed skill.
#[derive(Parser, Debug)]
#[command(name = "loom")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Run without an oracle; plans come from the fallback planner
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a task until its goal state is reached
    Run {
        /// What to write
        request: String,

        /// Task category (write_chapter, plan_chapter, draft_chapter, ...)
        #[arg(long, default_value = "write_chapter")]
        intent: String,

        /// Narrative context JSON file
        #[arg(long, value_name = "PATH")]
        context: Option<PathBuf>,

        /// Writing intent JSON file ({"goals": [...], "constraints": [...]})
        #[arg(long, value_name = "PATH")]
        intent_file: Option<PathBuf>,

        /// Resume from a saved state store
        #[arg(long, value_name = "PATH")]
        state: Option<PathBuf>,

        /// Save the final state store here
        #[arg(long, value_name = "PATH")]
        save: Option<PathBuf>,
    },

    /// Show the next plan without executing it
    Plan {
        /// Task category
        #[arg(long, default_value = "write_chapter")]
        intent: String,

        /// State store JSON file
        #[arg(long, value_name = "PATH")]
        state: Option<PathBuf>,

        /// Request text given to the planner
        #[arg(long, default_value = "")]
        request: String,
    },

    /// Run the consistency gate over a text file
    Check {
        /// Text to check
        file: PathBuf,

        /// Narrative context JSON file
        #[arg(long, value_name = "PATH")]
        context: Option<PathBuf>,

        /// Writing intent JSON file ({"goals": [...], "constraints": [...]})
        #[arg(long, value_name = "PATH")]
        intent_file: Option<PathBuf>,
    },

    /// List the skill contract catalogue
    Skills,

    /// List the merged rule catalogue
    Rules,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["loom", "--json", "--offline", "--log", "debug", "skills"]);
        assert!(cli.json);
        assert!(cli.offline);
        assert_eq!(cli.log.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Command::Skills));
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::parse_from([
            "loom",
            "run",
            "chapter three: the harbour",
            "--intent",
            "draft_chapter",
            "--save",
            "state.json",
        ]);
        if let Command::Run {
            request,
            intent,
            context,
            intent_file,
            save,
            ..
        } = cli.command
        {
            assert_eq!(request, "chapter three: the harbour");
            assert_eq!(intent, "draft_chapter");
            assert!(context.is_none());
            assert!(intent_file.is_none());
            assert_eq!(save, Some(PathBuf::from("state.json")));
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_plan_defaults() {
        let cli = Cli::parse_from(["loom", "plan"]);
        if let Command::Plan {
            intent, request, ..
        } = cli.command
        {
            assert_eq!(intent, "write_chapter");
            assert_eq!(request, "");
        } else {
            panic!("Expected Plan command");
        }
    }

    #[test]
    fn test_run_with_intent_file() {
        let cli = Cli::parse_from([
            "loom",
            "run",
            "chapter four",
            "--intent-file",
            "intent.json",
        ]);
        if let Command::Run { intent_file, .. } = cli.command {
            assert_eq!(intent_file, Some(PathBuf::from("intent.json")));
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_check_command() {
        let cli = Cli::parse_from(["loom", "check", "draft.md", "--intent-file", "intent.json"]);
        if let Command::Check {
            file, intent_file, ..
        } = cli.command
        {
            assert_eq!(file, PathBuf::from("draft.md"));
            assert_eq!(intent_file, Some(PathBuf::from("intent.json")));
        } else {
            panic!("Expected Check command");
        }
    }
}
