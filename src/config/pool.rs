//! Worker pool configuration.

use super::parse::env_parse;
use super::ConfigError;
use crate::pool::PoolConfig;

/// Workers per CPU when `POOL_CAPACITY` is unset.
const WORKERS_PER_CPU: usize = 64;

/// Load the worker pool sizing from environment variables.
///
/// `POOL_CAPACITY=0` (the default) sizes the pool from the CPU count.
pub fn pool_from_env() -> Result<PoolConfig, ConfigError> {
    let capacity = match env_parse("POOL_CAPACITY", 0usize)? {
        0 => num_cpus::get() * WORKERS_PER_CPU,
        n => n,
    };

    let config = PoolConfig::new(
        capacity,
        env_parse("POOL_BACKLOG", 1usize)?,
        env_parse("POOL_PRESPAWN", 1usize)?,
    );

    config
        .validate()
        .map_err(|e| ConfigError::invalid("POOL_*", e.message()))?;

    Ok(config)
}
