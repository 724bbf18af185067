//! Tracing subscriber setup
//!
//! Logs go to stderr (stdout carries command output) in compact or JSON form,
//! and optionally to a daily rolling file.

use crate::config::LoggingConfig;
use crate::error::{BridgeError, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter precedence: `--debug`, then `RUST_LOG`, then the configured level
pub fn build_filter(config: &LoggingConfig, debug: bool) -> EnvFilter {
    if debug {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Keep the returned guard alive for as long
/// as file logging should be flushed.
pub fn init(config: &LoggingConfig, debug: bool) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(config, debug);

    let console_layer = if config.json_format {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().compact().with_writer(std::io::stderr).boxed()
    };

    let (file_layer, guard) = match config.file.as_deref() {
        Some(file) => {
            let path = Path::new(file);
            let file_name = path
                .file_name()
                .ok_or_else(|| BridgeError::config(format!("Invalid log file path: {file}")))?;
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));

            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| BridgeError::config(format!("Failed to initialize logging: {e}")))?;

    Ok(guard)
}
