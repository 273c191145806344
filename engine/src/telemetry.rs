//! Telemetry and Observability
//!
//! Handles setting up `tracing-subscriber` for structured logging.
//! Supports config-driven log levels, environment variable overrides,
//! and format switching between pretty (debug) and JSON (release).

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter directive used when `RUST_LOG` is not set
fn default_directive(log_level: &str) -> String {
    format!("{},loom_engine={},loom={}", log_level, log_level, log_level)
}

/// Initialize the tracing subscriber with the given log level from config.
///
/// Priority: `RUST_LOG` env var > `log_level` parameter > default "info"
///
/// In debug builds: pretty-printed terminal output.
/// In release builds: JSON structured output with spans.
///
/// Logs go to stderr so `--json` output on stdout stays machine-readable.
pub fn init_telemetry_with_level(log_level: &str) {
    let default_filter = default_directive(log_level);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }
}

/// Initialize the tracing subscriber with default settings.
///
/// Falls back to "info" level if no `RUST_LOG` env var is set.
/// Use `init_telemetry_with_level` when config is available.
pub fn init_telemetry() {
    init_telemetry_with_level("info");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_targets_engine() {
        let directive = default_directive("debug");
        assert!(directive.starts_with("debug,"));
        assert!(directive.contains("loom_engine=debug"));
    }

    #[test]
    fn test_init_is_idempotent() {
        init_telemetry_with_level("warn");
        init_telemetry();
    }
}
