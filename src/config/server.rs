//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use super::parse::{env_duration, env_opt, env_or, env_parse, parse_size};
use super::ConfigError;

/// Server configuration loaded from environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen address (default: 0.0.0.0:8080).
    pub listen_addr: SocketAddr,
    /// Kernel accept queue length (default: 1024).
    pub listen_backlog: i32,
    /// Pause before re-arming the listener after a saturated or failed
    /// accept (default: 5ms).
    pub accept_cooldown: Duration,
    /// How long an accept waits for a worker (default: 1ms).
    pub accept_timeout: Duration,
    /// Per-operation read/write timeout on connections (default: 100ms).
    pub io_timeout: Duration,
    /// Largest inbound message in bytes (default: 1 MiB).
    pub max_message_size: usize,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_value = env_or("LISTEN_ADDR", "0.0.0.0:8080");
        let listen_addr: SocketAddr = listen_value
            .parse()
            .map_err(|e| ConfigError::parse("LISTEN_ADDR", listen_value.as_str(), e))?;

        let listen_backlog: i32 = env_parse("LISTEN_BACKLOG", 1024)?;
        if listen_backlog <= 0 {
            return Err(ConfigError::invalid("LISTEN_BACKLOG", "must be greater than zero"));
        }

        let max_message_size = match env_opt("MAX_MESSAGE_SIZE") {
            Some(v) => parse_size(&v).map_err(|e| ConfigError::parse("MAX_MESSAGE_SIZE", v, e))?,
            None => 1024 * 1024,
        };
        if max_message_size == 0 {
            return Err(ConfigError::invalid("MAX_MESSAGE_SIZE", "must be greater than zero"));
        }

        Ok(Self {
            listen_addr,
            listen_backlog,
            accept_cooldown: env_duration("ACCEPT_COOLDOWN", "5ms")?,
            accept_timeout: env_duration("ACCEPT_TIMEOUT", "1ms")?,
            io_timeout: env_duration("IO_TIMEOUT", "100ms")?,
            max_message_size,
        })
    }
}
