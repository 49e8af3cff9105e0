//! wspoll - WebSocket server core over a bounded worker pool and epoll.
//!
//! Connections are multiplexed on one-shot epoll readiness. Every blocking
//! step (accept + handshake, frame reads, application callbacks) runs on a
//! shared [`WorkerPool`](pool::WorkerPool) with admission control, so load
//! is bounded by the pool rather than by the number of open connections.
//!
//! # Features
//!
//! - **Worker pool**: bounded capacity, bounded backlog, on-demand spawning,
//!   timeouts on admission and graceful termination
//! - **Exclusive reads**: each socket reads one message at a time; the
//!   handler may release the socket early through [`Resume`](socket::Resume)
//! - **Accept backpressure**: a listener that cannot get a worker in time
//!   cools down instead of spinning
//! - **JSON router**: `{"m": ..., "p": ...}` commands dispatched by method
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wspoll::pool::{PoolConfig, WorkerPool};
//! use wspoll::router::Router;
//! use wspoll::server::{ListenConfig, Server};
//!
//! let mut router = Router::new();
//! router.register("echo", |req| req.write_success(req.params().clone()));
//!
//! let server = Server::new(WorkerPool::new(PoolConfig::new(256, 1, 1))?)?;
//! let listener = std::net::TcpListener::bind("0.0.0.0:8080")?;
//! server.listen(listener, ListenConfig::default(), Arc::new(router))?;
//! ```

/// Package version from Cargo.toml
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Short git commit hash, empty when built outside a checkout
pub const BUILD_VERSION: &str = env!("BUILD_VERSION");

/// Full version string: "0.1.0 (abc1234)"
pub const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("BUILD_VERSION"), ")");

pub mod config;
pub mod error;
pub mod listener;
pub mod logging;
pub mod poller;
pub mod pool;
pub mod protocol;
pub mod router;
pub mod server;
pub mod socket;

// Re-exports for convenience
pub use config::Config;
pub use error::{Error, Result};
pub use pool::{PoolConfig, WorkerPool};
pub use router::Router;
pub use server::{EventHandler, ListenConfig, Server};
pub use socket::{Resume, Socket};
