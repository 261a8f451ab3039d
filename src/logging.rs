//! Diagnostic logging setup.
//!
//! Diagnostics go to stderr through `tracing-subscriber`; the session event
//! log is separate (see [`crate::structured_logger`]).

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter directives in this variable win over the configured level.
pub const LOG_ENV: &str = "COMPILE_SESSION_LOG";

pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = build_filter(config);

    let fmt_layer = match config.format.as_str() {
        "json" => fmt::layer()
            .json()
            .with_target(true)
            .with_file(config.file_line)
            .with_line_number(config.file_line)
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .boxed(),
        "pretty" => fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(config.file_line)
            .with_line_number(config.file_line)
            .with_writer(std::io::stderr)
            .boxed(),
        _ => fmt::layer()
            .compact()
            .with_target(true)
            .with_file(config.file_line)
            .with_line_number(config.file_line)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to install the log subscriber")?;

    tracing::debug!(
        level = %config.level,
        format = %config.format,
        "logging initialized"
    );
    Ok(())
}

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}
