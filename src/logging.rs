//! Tracing setup for the CLI
//!
//! Logs go to stderr so stdout stays clean for command output (JSON
//! responses, tokens). `SLUGSHOT_LOG` takes precedence over the configured
//! level.

use std::env;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::SlugshotError;
use crate::config::LoggingConfig;

/// Environment variable holding a filter directive
pub const LOG_ENV: &str = "SLUGSHOT_LOG";

fn filter_directive(config: &LoggingConfig, verbose: bool) -> String {
    if let Ok(directive) = env::var(LOG_ENV) {
        return directive;
    }
    if verbose {
        "debug".to_string()
    } else {
        config.level.clone()
    }
}

/// Install the global subscriber
///
/// The returned guard flushes the file writer when dropped; keep it alive
/// for the lifetime of the program.
///
/// # Errors
///
/// Returns `SlugshotError::InvalidInput` if the filter directive is invalid
/// or a subscriber is already installed.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<Option<WorkerGuard>, SlugshotError> {
    let filter = EnvFilter::try_new(filter_directive(config, verbose))
        .map_err(|e| SlugshotError::InvalidInput(format!("Invalid log filter: {e}")))?;

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let directory = path.parent().unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .map_or_else(|| "slugshot.log".into(), |n| n.to_os_string());
            std::fs::create_dir_all(directory)?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .with(file_layer)
        .with(filter)
        .try_init()
        .map_err(|e| SlugshotError::InvalidInput(format!("Logging already initialized: {e}")))?;

    Ok(guard)
}
