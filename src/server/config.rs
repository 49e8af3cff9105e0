//! Listen-time configuration.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use wspoll::server::ListenConfig;
//!
//! let config = ListenConfig::default()
//!     .with_cooldown(Duration::from_millis(5))
//!     .with_accept_timeout(Duration::from_millis(1))
//!     .with_io_timeout(Duration::from_millis(100));
//! ```

use std::time::Duration;

/// Settings fixed for the lifetime of one listener.
///
/// | Field | Default | Env (via [`Config`](crate::config::Config)) |
/// |-------|---------|------|
/// | `cooldown` | 5ms | `ACCEPT_COOLDOWN` |
/// | `accept_timeout` | 1ms | `ACCEPT_TIMEOUT` |
/// | `io_timeout` | 100ms | `IO_TIMEOUT` |
/// | `max_message_size` | 1 MiB | `MAX_MESSAGE_SIZE` |
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenConfig {
    /// Pause before re-arming the listener after a schedule timeout or a
    /// temporary accept error.
    pub cooldown: Duration,
    /// How long an accept waits for a worker.
    pub accept_timeout: Duration,
    /// Read/write timeout applied to every connection. Zero disables it.
    pub io_timeout: Duration,
    /// Largest inbound message in bytes.
    pub max_message_size: usize,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_millis(5),
            accept_timeout: Duration::from_millis(1),
            io_timeout: Duration::from_millis(100),
            max_message_size: 1024 * 1024,
        }
    }
}

impl ListenConfig {
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_accept_timeout(mut self, timeout: Duration) -> Self {
        self.accept_timeout = timeout;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }
}
