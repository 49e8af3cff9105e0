//! Configuration module for wspoll.
//!
//! This module provides centralized configuration loading from environment variables.
//!
//! # Example
//!
//! ```rust,ignore
//! use wspoll::config::Config;
//!
//! let config = Config::from_env()?;
//! println!("Listen address: {}", config.server.listen_addr);
//! println!("Workers: {}", config.pool.capacity);
//! ```

mod error;
mod logging;
mod parse;
mod pool;
mod server;

pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use parse::parse_duration;
pub use server::ServerConfig;

use crate::pool::PoolConfig;
use crate::server::ListenConfig;

/// Serializes tests that read or write process environment variables.
#[cfg(test)]
pub(crate) static ENV_LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

/// Complete application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Worker pool sizing.
    pub pool: PoolConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::from_env()?,
            pool: pool::pool_from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }

    /// Listen-time settings for [`Server::listen`](crate::server::Server::listen).
    pub fn listen_config(&self) -> ListenConfig {
        ListenConfig::default()
            .with_cooldown(self.server.accept_cooldown)
            .with_accept_timeout(self.server.accept_timeout)
            .with_io_timeout(self.server.io_timeout)
            .with_max_message_size(self.server.max_message_size)
    }

    /// Print configuration summary to log.
    pub fn log_summary(&self) {
        use tracing::info;

        info!("Configuration loaded:");
        info!("  Listen: {} (backlog {})", self.server.listen_addr, self.server.listen_backlog);
        info!(
            "  Pool: capacity {}, backlog {}, prespawn {}",
            self.pool.capacity, self.pool.backlog, self.pool.prespawn
        );
        info!("  Accept cooldown: {:?}", self.server.accept_cooldown);
        info!("  Accept timeout: {:?}", self.server.accept_timeout);
        info!("  I/O timeout: {:?}", self.server.io_timeout);
        info!("  Max message size: {} bytes", self.server.max_message_size);
        info!("  Log format: {:?}", self.logging.format);
    }
}
