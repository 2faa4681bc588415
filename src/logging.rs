// src/logging.rs

//! Logging setup for `evalflow` using `tracing` + `tracing-subscriber`.
//!
//! The filter comes from, in order:
//! 1. `--log-level`, applied to the `evalflow` target only
//! 2. `EVALFLOW_LOG`: a level name (`error`, `warn`/`warning`, `info`,
//!    `debug`, `trace`) applied like the flag, or else a full `EnvFilter`
//!    directive string (e.g. `evalflow::engine=trace,info`)
//! 3. [`DEFAULT_DIRECTIVE`]
//!
//! Logs go to stderr; stdout carries only command output (tables, reports,
//! generated commands).

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

/// Environment variable consulted when no `--log-level` is given.
pub const LOG_ENV: &str = "EVALFLOW_LOG";

/// Our own events at info, everything else at warn.
pub const DEFAULT_DIRECTIVE: &str = "evalflow=info,warn";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env_value = std::env::var(LOG_ENV).ok();
    let directive = filter_directive(cli_level, env_value.as_deref());
    let filter = EnvFilter::try_new(&directive)
        .map_err(|e| anyhow!("invalid log filter '{directive}': {e}"))?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("installing log subscriber: {e}"))?;

    Ok(())
}

/// The `EnvFilter` directive for a CLI level and the value of `EVALFLOW_LOG`.
pub fn filter_directive(cli_level: Option<LogLevel>, env_value: Option<&str>) -> String {
    if let Some(level) = cli_level {
        return format!("evalflow={},warn", level.as_str());
    }
    let Some(value) = env_value.map(str::trim).filter(|v| !v.is_empty()) else {
        return DEFAULT_DIRECTIVE.to_string();
    };
    match parse_level_word(value) {
        Some(level) => format!("evalflow={},warn", level.as_str()),
        None => value.to_string(),
    }
}

/// Plain level names, case-insensitive. `warning` is accepted for `warn`.
fn parse_level_word(s: &str) -> Option<LogLevel> {
    match s.to_lowercase().as_str() {
        "error" => Some(LogLevel::Error),
        "warn" | "warning" => Some(LogLevel::Warn),
        "info" => Some(LogLevel::Info),
        "debug" => Some(LogLevel::Debug),
        "trace" => Some(LogLevel::Trace),
        _ => None,
    }
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}
