//! Connectivity state and retry backoff policy.
//!
//! The types live here so the reconnect arithmetic stays pure and
//! testable; driving the actual state machine is the client's job.

use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// Connectivity status of the sync engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// No connection to the remote store
    #[default]
    Disconnected,
    /// Network is up, probing the remote store
    Connecting,
    /// Draining the offline queue
    Syncing,
    /// Connected and idle
    Connected,
    /// Probe or drain failed; waiting for a retry or a network signal
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Disconnected => "disconnected",
            SyncStatus::Connecting => "connecting",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Connected => "connected",
            SyncStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session-wide sync state, mutated only by the sync engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Current connectivity status
    pub status: SyncStatus,
    /// When the last successful drain finished (milliseconds since epoch)
    pub last_synced_at: Option<Timestamp>,
    /// Consecutive failed reconnect attempts
    pub retry_count: u32,
}

impl SyncState {
    /// Fresh state: disconnected, never synced.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Exponential backoff for reconnect attempts.
///
/// The delay for attempt `n` (zero-based) is `min(base_ms * 2^n, cap_ms)`.
/// After `max_attempts` failures the engine stops retrying on its own and
/// waits for the next external network-up signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffPolicy {
    /// First retry delay in milliseconds
    pub base_ms: u64,
    /// Upper bound on any single delay
    pub cap_ms: u64,
    /// Automatic retries before giving up
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            cap_ms: 30_000,
            max_attempts: 8,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the next retry, or `None` when attempts are exhausted.
    pub fn delay_ms(&self, retry_count: u32) -> Option<u64> {
        if retry_count >= self.max_attempts {
            return None;
        }
        let delay = 2u64
            .checked_pow(retry_count)
            .and_then(|factor| self.base_ms.checked_mul(factor))
            .unwrap_or(u64::MAX);
        Some(delay.min(self.cap_ms))
    }

    /// True once no automatic retry remains.
    pub fn exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_attempts
    }
}
