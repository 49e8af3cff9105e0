//! Listening socket setup.
//!
//! The accept path is driven by the poller, so listeners are created
//! non-blocking and handed over as plain `std` listeners.

mod tcp;

pub use tcp::bind;

use std::net::SocketAddr;

/// Default pending-connection queue length.
pub const DEFAULT_BACKLOG: i32 = 1024;

/// Configuration for creating listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Address to bind to.
    pub addr: SocketAddr,
    /// Length of the kernel accept queue.
    pub backlog: i32,
    /// Allow several processes to bind the same port.
    pub reuse_port: bool,
}

impl ListenerConfig {
    /// Create a new TCP listener configuration.
    pub fn tcp(addr: SocketAddr) -> Self {
        Self {
            addr,
            backlog: DEFAULT_BACKLOG,
            reuse_port: false,
        }
    }

    pub fn with_backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn with_reuse_port(mut self, reuse_port: bool) -> Self {
        self.reuse_port = reuse_port;
        self
    }
}
