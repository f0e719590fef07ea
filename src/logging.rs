/// Logging setup for netprobe
///
/// This module initializes and configures the tracing-based logging system
/// with support for console and file output, structured logging, and
/// configurable levels.

use crate::config::LoggingConfig;
use crate::error::{ProbeError, ProbeResult};
use std::path::Path;
use tracing::{info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging system based on configuration
///
/// # Arguments
/// * `config` - Logging configuration
///
/// # Returns
/// * `ProbeResult<Option<WorkerGuard>>` - Guard that must be kept alive for file logging
pub fn init_logging(config: &LoggingConfig) -> ProbeResult<Option<WorkerGuard>> {
    // Parse log level (for validation)
    let _log_level = parse_log_level(&config.level)?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("netprobe={}", config.level)));

    let guard = if config.file_logging {
        let log_dir = Path::new(&config.log_dir);

        if !log_dir.exists() {
            std::fs::create_dir_all(log_dir).map_err(|e| {
                ProbeError::fatal(format!("Failed to create log directory: {}", e))
            })?;
        }

        let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix("netprobe")
            .filename_suffix("log")
            .max_log_files(config.max_files)
            .build(log_dir)
            .map_err(|e| ProbeError::fatal(format!("Failed to create file appender: {}", e)))?;

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if config.format == "json" {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_target(true).with_writer(std::io::stdout))
                .with(fmt::layer().with_target(true).with_writer(non_blocking))
                .init();
        }

        Some(guard)
    } else {
        if config.format == "json" {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_target(true))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_target(true))
                .init();
        }

        None
    };

    info!(
        "Logging initialized: level={}, format={}, file_logging={}",
        config.level, config.format, config.file_logging
    );

    Ok(guard)
}

/// Parse log level string to tracing Level
pub fn parse_log_level(level: &str) -> ProbeResult<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(ProbeError::validation(
            "log_level",
            format!("Invalid log level: {}", level),
        )),
    }
}

/// Macro for logging probe events with structured data
#[macro_export]
macro_rules! log_probe_event {
    ($level:expr, $target:expr, $method:expr, $status:expr, $msg:expr) => {
        tracing::event!(
            $level,
            target_addr = %$target,
            method = %$method,
            status = %$status,
            "{}",
            $msg
        );
    };
}

/// Macro for logging rate adjustment events
#[macro_export]
macro_rules! log_rate_adjustment {
    ($old_pps:expr, $new_pps:expr, $reason:expr, $loss:expr) => {
        tracing::info!(
            old_pps = $old_pps,
            new_pps = $new_pps,
            reason = $reason,
            observed_loss = $loss,
            "Rate adjustment"
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert!(matches!(parse_log_level("info"), Ok(Level::INFO)));
        assert!(matches!(parse_log_level("debug"), Ok(Level::DEBUG)));
        assert!(matches!(parse_log_level("ERROR"), Ok(Level::ERROR)));
        assert!(parse_log_level("invalid").is_err());
    }
}
