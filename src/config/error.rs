//! Errors raised while reading configuration from the environment.

use std::fmt;

/// A rejected environment variable.
///
/// Both variants carry the variable name so `main` can report which
/// setting to fix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The raw value does not parse as the expected type.
    Parse {
        key: String,
        value: String,
        error: String,
    },
    /// The value parsed but is outside what the server accepts.
    Invalid { key: String, message: String },
}

impl ConfigError {
    pub(crate) fn parse(key: &str, value: impl Into<String>, error: impl fmt::Display) -> Self {
        ConfigError::Parse {
            key: key.to_string(),
            value: value.into(),
            error: error.to_string(),
        }
    }

    pub(crate) fn invalid(key: &str, message: impl fmt::Display) -> Self {
        ConfigError::Invalid {
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    /// Name of the offending environment variable.
    pub fn key(&self) -> &str {
        match self {
            ConfigError::Parse { key, .. } | ConfigError::Invalid { key, .. } => key,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse { key, value, error } => {
                write!(f, "{}={:?} does not parse: {}", key, value, error)
            }
            ConfigError::Invalid { key, message } => write!(f, "{} rejected: {}", key, message),
        }
    }
}

impl std::error::Error for ConfigError {}
