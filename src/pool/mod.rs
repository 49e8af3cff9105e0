//! Bounded worker pool.
//!
//! Tasks are closures executed on a bounded set of reusable OS threads.
//! Workers are spawned lazily up to `capacity`; a bounded backlog absorbs
//! short bursts; callers block only until an admission decision is made.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      WorkerPool                            │
//! ├────────────────────────────────────────────────────────────┤
//! │   schedule() ──► admission (one lock, one condvar wait)    │
//! │                   │            │            │              │
//! │           handoff/backlog    spawn      timeout/terminated │
//! │                   │            │                           │
//! │              ┌────▼────┐  ┌────▼────┐                      │
//! │              │ backlog │  │ Worker  │  ...  (≤ capacity)   │
//! │              └────┬────┘  └────┬────┘                      │
//! │                   └──── pull ◄─┘                           │
//! └────────────────────────────────────────────────────────────┘
//! ```

mod error;
mod thread;

pub use error::{PoolError, PoolResult};
pub use thread::{End, WorkerPool};

/// Sizing of a [`WorkerPool`], fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of live workers.
    pub capacity: usize,
    /// Number of tasks that may wait for a worker.
    pub backlog: usize,
    /// Workers started eagerly at creation.
    pub prespawn: usize,
}

impl PoolConfig {
    pub fn new(capacity: usize, backlog: usize, prespawn: usize) -> Self {
        Self {
            capacity,
            backlog,
            prespawn,
        }
    }

    /// Reject configurations that could never make progress.
    pub fn validate(&self) -> PoolResult<()> {
        if self.capacity == 0 {
            return Err(PoolError::InvalidConfig("capacity must be greater than zero"));
        }
        if self.prespawn == 0 && self.backlog > 0 {
            // Queued tasks would wait for a worker that is never spawned.
            return Err(PoolError::InvalidConfig("dead queue configuration"));
        }
        if self.prespawn > self.capacity {
            return Err(PoolError::InvalidConfig(
                "prespawn must be less than or equal to capacity",
            ));
        }
        Ok(())
    }
}

/// Point-in-time view of pool occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Workers currently alive.
    pub live: usize,
    /// Workers parked waiting for a task.
    pub idle: usize,
    /// Tasks sitting in the backlog.
    pub queued: usize,
    /// Whether `terminate` has been called.
    pub terminated: bool,
}
