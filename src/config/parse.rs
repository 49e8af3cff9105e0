//! Environment variable parsing utilities.

use std::str::FromStr;
use std::time::Duration;

use super::ConfigError;

/// Get environment variable with default value.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get optional environment variable (None if empty or missing).
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

/// Parse environment variable with type conversion.
pub fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env_opt(key) {
        Some(v) => v.trim().parse().map_err(|e: T::Err| ConfigError::parse(key, v.as_str(), e)),
        None => Ok(default),
    }
}

/// Parse duration string (e.g., "5ms", "30s", "2m", "1h").
/// A bare number is taken as milliseconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (num_str, unit) = s.split_at(split);

    let num: u64 = num_str
        .parse()
        .map_err(|_| format!("invalid number: {}", num_str))?;

    let secs_per_unit = match unit {
        "" | "ms" => return Ok(Duration::from_millis(num)),
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => return Err(format!("invalid unit: {}", unit)),
    };
    num.checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration out of range: {}", s))
}

/// Parse environment variable as duration.
pub fn env_duration(key: &str, default: &str) -> Result<Duration, ConfigError> {
    let value = env_opt(key).unwrap_or_else(|| default.to_string());
    parse_duration(&value).map_err(|e| ConfigError::parse(key, value.as_str(), e))
}

/// Parse a size with an optional `k`/`m` suffix (KiB, MiB).
pub fn parse_size(s: &str) -> Result<usize, String> {
    let s = s.trim().to_lowercase();
    let (num_str, factor) = match s.strip_suffix('k') {
        Some(num) => (num, 1024),
        None => match s.strip_suffix('m') {
            Some(num) => (num, 1024 * 1024),
            None => (s.as_str(), 1),
        },
    };

    let num: usize = num_str
        .parse()
        .map_err(|_| format!("invalid size: {}", s))?;
    num.checked_mul(factor)
        .ok_or_else(|| format!("size overflows: {}", s))
}
