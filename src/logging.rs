//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Level priority: `--log-level`, then `RUST_LOG`, then `info`. Logs go to
//! stderr; stdout carries only forwarded entries.

use tracing_subscriber::EnvFilter;

use crate::LogLevel;

/// Install the global subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) {
    let filter = match cli_level {
        Some(level) => EnvFilter::new(level_directive(level)),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn level_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
