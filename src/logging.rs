//! Tracing subscriber setup for the CLI.
//!
//! Human-readable output goes to stderr so stdout stays usable for JSON UI
//! output. With a log directory, a daily-rotated JSON file is written too.
//! `RUST_LOG` always takes precedence over the computed default level.

use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub const LOG_FILE_PREFIX: &str = "campaign.log";

/// Default level for a `-v` count, unless the config names one.
pub fn default_level(verbosity: u8, configured: Option<&str>) -> Result<LevelFilter> {
    match verbosity {
        0 => match configured {
            Some(level) => LevelFilter::from_str(level)
                .with_context(|| format!("Invalid log level '{}'", level)),
            None => Ok(LevelFilter::WARN),
        },
        1 => Ok(LevelFilter::INFO),
        2 => Ok(LevelFilter::DEBUG),
        _ => Ok(LevelFilter::TRACE),
    }
}

fn env_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and stops the file writer.
pub fn init(level: LevelFilter, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_filter(env_filter(level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_current_span(true)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(env_filter(level.max(LevelFilter::INFO)));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_level_from_verbosity() {
        assert_eq!(default_level(0, None).unwrap(), LevelFilter::WARN);
        assert_eq!(default_level(1, Some("error")).unwrap(), LevelFilter::INFO);
        assert_eq!(default_level(2, None).unwrap(), LevelFilter::DEBUG);
        assert_eq!(default_level(5, None).unwrap(), LevelFilter::TRACE);
    }

    #[test]
    fn test_configured_level_applies_without_flags() {
        assert_eq!(default_level(0, Some("debug")).unwrap(), LevelFilter::DEBUG);
        assert!(default_level(0, Some("loud")).is_err());
    }
}
