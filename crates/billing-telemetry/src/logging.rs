//! Structured logging.
//!
//! Logs go to stderr so that the status lines a CLI prints on stdout stay
//! machine-readable. JSON output carries the same key=value fields the
//! crates attach to their events.

use tracing_subscriber::{fmt, EnvFilter};

use crate::{TelemetryConfig, TelemetryError};

/// Build the filter for a configuration.
pub fn env_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(&config.log_level).map_err(|e| TelemetryError::Config(e.to_string()))
}

/// Install the global subscriber.
///
/// Returns `LoggerInit` if a subscriber is already installed.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = env_filter(config)?;

    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(config.with_source_location)
        .with_line_number(config.with_source_location);

    let installed = if config.json_logs {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    installed.map_err(|e| TelemetryError::LoggerInit(e.to_string()))?;

    tracing::debug!(
        service = %config.service_name,
        json_logs = config.json_logs,
        level = %config.log_level,
        "Structured logging configured"
    );
    Ok(())
}
