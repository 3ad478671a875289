// src/logging.rs

//! Logging setup for `fallax` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `FALLAX_LOG` environment variable (full `EnvFilter` syntax, e.g.
//!    `"info,fallax::sensor=trace"`)
//! 2. `-d/--debug`: everything at debug
//! 3. `-v/--verbose`: info, with `fallax` at debug
//! 4. worker `-l/--loglevel`: that level for dependencies, with `fallax`
//!    kept at info or more verbose
//! 5. default: warn, with `fallax` at info
//!
//! Logs are sent to STDERR so that command stdout stays free.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "FALLAX_LOG";

/// Verbosity requested on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Verbosity<'a> {
    pub verbose: u8,
    pub debug: bool,
    /// Level given to a worker with `-l`.
    pub worker_level: Option<&'a str>,
}

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(verbosity: Verbosity<'_>) -> Result<()> {
    let filter = match std::env::var(LOG_ENV) {
        Ok(spec) if !spec.trim().is_empty() => EnvFilter::try_new(spec.trim())
            .map_err(|e| anyhow!("invalid {LOG_ENV} filter: {e}"))?,
        _ => EnvFilter::new(filter_directives(verbosity)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(())
}

/// `EnvFilter` directives for the command-line verbosity.
pub fn filter_directives(verbosity: Verbosity<'_>) -> String {
    if verbosity.debug {
        return "debug".to_string();
    }
    if verbosity.verbose > 0 {
        return "info,fallax=debug".to_string();
    }
    if let Some(level) = verbosity.worker_level.and_then(parse_level_str) {
        let name = level.as_str().to_lowercase();
        // More verbose levels compare greater.
        if level > tracing::Level::INFO {
            return name;
        }
        return format!("{name},fallax=info");
    }
    "warn,fallax=info".to_string()
}

/// Map level names, including the `warning`/`critical` spellings used in
/// supervisor configs, to `tracing` levels.
pub fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "critical" | "fatal" | "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}
