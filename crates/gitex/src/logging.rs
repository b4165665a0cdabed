#![forbid(unsafe_code)]

//! Tracing initialization for the command line tool.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Environment variable holding per-target log levels, e.g. `GITEX_LOG=gitex::slice=debug`.
pub const LOG_ENV: &str = "GITEX_LOG";
pub const DEFAULT_FILTER: &str = "gitex=warn";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber, writing to stderr or to `log_file`.
///
/// The returned guard flushes the file writer on drop and must be held until exit. Calling
/// this again after a subscriber is installed has no effect.
pub fn init_tracing(log_file: Option<&Path>) -> Option<WorkerGuard> {
    let Some(log_file) = log_file else {
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .with(env_filter())
            .try_init();
        return None;
    };

    let directory = log_file
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = log_file
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "gitex.log".into());

    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true),
        )
        .with(env_filter())
        .try_init();
    Some(guard)
}
