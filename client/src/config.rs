//! Configuration management for the sync client.

use shelfsync_engine::BackoffPolicy;
use std::env;

/// Interval between queue drains while connected, in milliseconds.
const DEFAULT_RESYNC_INTERVAL_MS: u64 = 60_000;

/// Interval between liveness probes, in milliseconds.
const DEFAULT_LIVENESS_INTERVAL_MS: u64 = 30_000;

/// Buffered snapshots per entity-change broadcast channel.
const DEFAULT_EVENT_CAPACITY: usize = 32;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Reconnect backoff policy
    pub backoff: BackoffPolicy,
    /// How often the offline queue is re-drained while connected
    pub resync_interval_ms: u64,
    /// How often the remote store is probed for liveness
    pub liveness_interval_ms: u64,
    /// Capacity of the per-entity broadcast channels
    pub event_capacity: usize,
    /// API key for the Google Books metadata provider
    pub google_books_api_key: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            resync_interval_ms: DEFAULT_RESYNC_INTERVAL_MS,
            liveness_interval_ms: DEFAULT_LIVENESS_INTERVAL_MS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            google_books_api_key: None,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables, with defaults for
    /// anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = BackoffPolicy::default();

        let base_ms = read_ms("SHELFSYNC_RETRY_BASE_MS", defaults.base_ms)?;
        let cap_ms = read_ms("SHELFSYNC_RETRY_CAP_MS", defaults.cap_ms)?;

        let max_attempts = env::var("SHELFSYNC_MAX_RETRIES")
            .unwrap_or_else(|_| defaults.max_attempts.to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidNumber("SHELFSYNC_MAX_RETRIES"))?;

        let resync_interval_ms =
            read_ms("SHELFSYNC_RESYNC_INTERVAL_MS", DEFAULT_RESYNC_INTERVAL_MS)?;
        let liveness_interval_ms =
            read_ms("SHELFSYNC_LIVENESS_INTERVAL_MS", DEFAULT_LIVENESS_INTERVAL_MS)?;

        let google_books_api_key = env::var("GOOGLE_BOOKS_API_KEY").ok();

        Ok(Self {
            backoff: BackoffPolicy {
                base_ms,
                cap_ms,
                max_attempts,
            },
            resync_interval_ms,
            liveness_interval_ms,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            google_books_api_key,
        })
    }
}

fn read_ms(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    env::var(var)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ConfigError::InvalidNumber(var))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}")]
    InvalidNumber(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_backoff_policy() {
        let config = SyncConfig::default();

        assert_eq!(config.backoff.base_ms, 1000);
        assert_eq!(config.backoff.cap_ms, 30_000);
        assert_eq!(config.backoff.max_attempts, 8);
        assert_eq!(config.resync_interval_ms, 60_000);
        assert_eq!(config.liveness_interval_ms, 30_000);
        assert!(config.google_books_api_key.is_none());
    }
}
