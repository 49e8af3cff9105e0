//! Worker pool error types.

use std::fmt;
use std::time::Duration;

/// Errors that can occur during pool operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// No idle worker, backlog slot or spawn slot became available in time.
    ScheduleTimeout(Duration),

    /// The pool is shutting down or has been shut down.
    Terminated,

    /// The pool configuration was rejected at construction.
    InvalidConfig(&'static str),

    /// The OS refused to start a worker thread.
    Spawn(String),
}

impl PoolError {
    /// Check if this is a schedule timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PoolError::ScheduleTimeout(_))
    }

    /// Check if the pool was terminated.
    pub fn is_terminated(&self) -> bool {
        matches!(self, PoolError::Terminated)
    }

    /// Get the error message for logging.
    pub fn message(&self) -> &str {
        match self {
            PoolError::ScheduleTimeout(_) => "Schedule timeout",
            PoolError::Terminated => "Pool terminated",
            PoolError::InvalidConfig(msg) => msg,
            PoolError::Spawn(_) => "Worker spawn failed",
        }
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::ScheduleTimeout(duration) => {
                write!(f, "schedule error: timed out after {:?}", duration)
            }
            PoolError::Terminated => {
                write!(f, "schedule error: pool is terminated")
            }
            PoolError::InvalidConfig(msg) => {
                write!(f, "invalid pool configuration: {}", msg)
            }
            PoolError::Spawn(msg) => {
                write!(f, "failed to spawn worker: {}", msg)
            }
        }
    }
}

impl std::error::Error for PoolError {}

/// Result type alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;
