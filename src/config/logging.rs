//! Logging configuration.

use std::str::FromStr;

use super::parse::env_or;
use super::ConfigError;

/// Log output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected text or json, got '{}'", other)),
        }
    }
}

/// Logging configuration loaded from environment.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Log level filter (from LOG_LEVEL or RUST_LOG).
    pub filter: String,
    /// Output format (from LOG_FORMAT).
    pub format: LogFormat,
    /// Service name for structured logging.
    pub service_name: String,
}

impl LoggingConfig {
    /// Load configuration from environment variables.
    ///
    /// Priority: LOG_LEVEL > RUST_LOG > default
    ///
    /// LOG_LEVEL accepts simple values: trace, debug, info, warn, error
    /// RUST_LOG accepts full tracing filter syntax: wspoll=debug,other=warn
    pub fn from_env() -> Result<Self, ConfigError> {
        let format_value = env_or("LOG_FORMAT", "text");
        let format = format_value
            .parse()
            .map_err(|error: String| ConfigError::parse("LOG_FORMAT", format_value.as_str(), error))?;

        Ok(Self {
            filter: Self::resolve_log_filter(),
            format,
            service_name: env_or("SERVICE_NAME", "wspoll"),
        })
    }

    /// Resolve log filter from environment.
    ///
    /// Priority: LOG_LEVEL > RUST_LOG > default (info)
    fn resolve_log_filter() -> String {
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            let level = level.to_lowercase();
            match level.as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => {
                    return format!("wspoll={}", level);
                }
                _ => {
                    // Logging is not up yet.
                    eprintln!(
                        "Warning: Invalid LOG_LEVEL '{}', expected: trace, debug, info, warn, error",
                        level
                    );
                }
            }
        }

        if let Ok(filter) = std::env::var("RUST_LOG") {
            return filter;
        }

        "wspoll=info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "wspoll=info".to_string(),
            format: LogFormat::Text,
            service_name: "wspoll".to_string(),
        }
    }
}
