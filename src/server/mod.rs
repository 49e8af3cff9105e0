//! Connection multiplexer.
//!
//! Listeners and connections are watched by two pollers so that a listener
//! sitting out an accept cooldown never delays connection events. All
//! blocking work (accept + handshake, frame reads, handler calls) runs on
//! the shared [`WorkerPool`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  event   ┌──────────────────────┐
//! │ accept poller├─────────►│ schedule_timeout     │──► accept + upgrade
//! └──────▲───────┘          │ (cooldown on timeout)│        │
//!        │ resume           └──────────────────────┘        │ register
//!        └──────────────────────────────────────────┐       ▼
//! ┌──────────────┐  event   ┌──────────────────────┐│ ┌────────────┐
//! │  conn poller ├─────────►│ schedule             ├┴►│ read_frame │
//! └──────▲───────┘          └──────────────────────┘  │ on_read    │
//!        │ resume (on release)                        └─────┬──────┘
//!        └──────────────────────────────────────────────────┘
//! ```

mod accept;
mod config;
mod conn;
mod handler;

pub use config::ListenConfig;
pub use handler::EventHandler;

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::listener::{self, ListenerConfig};
use crate::poller::Poller;
use crate::pool::WorkerPool;

use accept::Acceptor;

/// State shared by everything spawned from one `listen` call.
pub(crate) struct Context {
    pool: WorkerPool,
    poller: Poller,
    config: ListenConfig,
    handler: Arc<dyn EventHandler>,
}

/// WebSocket server driving connections over a shared worker pool.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use wspoll::pool::{PoolConfig, WorkerPool};
/// use wspoll::server::{ListenConfig, Server};
///
/// let pool = WorkerPool::new(PoolConfig::new(128, 1, 1))?;
/// let server = Server::new(pool)?;
/// let listener = std::net::TcpListener::bind("0.0.0.0:8080")?;
/// server.listen(listener, ListenConfig::default(), Arc::new(MyHandler))?;
/// // ...
/// server.shutdown();
/// ```
///
/// Dropping the server shuts it down.
pub struct Server {
    pool: WorkerPool,
    listeners: Poller,
    connections: Poller,
    shut_down: AtomicBool,
}

impl Server {
    /// Create a server and start its pollers.
    pub fn new(pool: WorkerPool) -> Result<Self> {
        Ok(Self {
            listeners: Poller::new(format!("{}-accept", pool.name()))?,
            connections: Poller::new(format!("{}-conn", pool.name()))?,
            pool,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Start accepting on `listener`. Returns the bound address.
    pub fn listen(
        &self,
        listener: TcpListener,
        config: ListenConfig,
        handler: Arc<dyn EventHandler>,
    ) -> Result<SocketAddr> {
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let ctx = Arc::new(Context {
            pool: self.pool.clone(),
            poller: self.connections.clone(),
            config,
            handler,
        });

        let acceptor = Arc::new(Acceptor::new(listener, self.listeners.clone(), ctx));
        let registered = Arc::clone(&acceptor);
        self.listeners
            .start(acceptor.desc(), move |event| registered.on_event(event))?;

        tracing::info!(
            addr = %addr,
            cooldown = ?config.cooldown,
            accept_timeout = ?config.accept_timeout,
            io_timeout = ?config.io_timeout,
            "listening"
        );
        Ok(addr)
    }

    /// Bind a listener with socket2 and start accepting on it.
    pub fn bind(
        &self,
        listener: &ListenerConfig,
        config: ListenConfig,
        handler: Arc<dyn EventHandler>,
    ) -> Result<SocketAddr> {
        self.listen(listener::bind(listener)?, config, handler)
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Number of registered connections.
    pub fn connections(&self) -> usize {
        self.connections.len()
    }

    /// Stop accepting, drain the pool, and disconnect every open
    /// connection. Safe to call more than once.
    pub fn shutdown(&self) {
        let first = !self.shut_down.swap(true, Ordering::AcqRel);
        if first {
            tracing::info!(connections = self.connections(), "shutting down");
        }
        self.pool.terminate();
        self.listeners.close();
        self.connections.close();
        if first {
            tracing::info!("shutdown complete");
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("pool", &self.pool)
            .field("connections", &self.connections())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpStream;

    use crate::pool::PoolConfig;
    use crate::router::Router;

    #[test]
    fn test_drop_shuts_down() {
        let pool = WorkerPool::new(PoolConfig::new(2, 1, 1)).unwrap();
        let server = Server::new(pool.clone()).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = server
            .listen(listener, ListenConfig::default(), Arc::new(Router::new()))
            .unwrap();

        drop(server);

        assert!(pool.is_terminated());
        // The listener went away with its registration.
        assert!(TcpStream::connect(addr).is_err());
    }

    #[test]
    fn test_shutdown_then_drop() {
        let pool = WorkerPool::new(PoolConfig::new(1, 0, 0)).unwrap();
        let server = Server::new(pool.clone()).unwrap();
        server.shutdown();
        assert!(pool.is_terminated());
        assert_eq!(server.connections(), 0);
        drop(server);
    }
}
