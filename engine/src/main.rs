// Loom narrative task engine
// Main entry point for the loom binary

use anyhow::Context;
use clap::Parser;
use loom_engine::app::{build_oracle, Loom};
use loom_engine::cli::{Cli, Command};
use loom_engine::config::Config;
use loom_engine::handlers::{
    handle_check, handle_plan, handle_rules, handle_run, handle_skills, OutputFormat,
};
use loom_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the config file; RUST_LOG wins over both
    let level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(level);

    tracing::info!(
        "Loom Engine v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    let oracle = build_oracle(&config, cli.offline);
    let loom = Loom::new(config, oracle)?;

    match cli.command {
        Command::Run {
            request,
            intent,
            context,
            intent_file,
            state,
            save,
        } => {
            tracing::info!("Running {} task: {}", intent, request);
            handle_run(
                &loom,
                request,
                &intent,
                context.as_deref(),
                intent_file.as_deref(),
                state.as_deref(),
                save.as_deref(),
                format,
            )
            .await
        }

        Command::Plan {
            intent,
            state,
            request,
        } => handle_plan(&loom, &intent, state.as_deref(), &request, format).await,

        Command::Check {
            file,
            context,
            intent_file,
        } => {
            handle_check(
                &loom,
                &file,
                context.as_deref(),
                intent_file.as_deref(),
                format,
            )
            .await
        }

        Command::Skills => handle_skills(&loom, format),

        Command::Rules => handle_rules(&loom, format),
    }
}
