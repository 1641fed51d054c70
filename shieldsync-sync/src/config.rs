//! Sync engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a shielded sync session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Deadline for each correlated worker request (milliseconds).
    pub request_timeout_ms: u64,

    /// Blocks fetched and ingested per step.
    pub chunk_size: u64,

    /// How far below the tip a sync starts when no height is given.
    pub lookback_blocks: u64,

    /// Fetch attempts per chunk before the run fails.
    pub fetch_attempts: u32,

    /// Pause between fetch attempts (milliseconds). 0 retries immediately.
    pub fetch_retry_backoff_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            chunk_size: 5_000,
            lookback_blocks: 100_000,
            fetch_attempts: 3,
            fetch_retry_backoff_ms: 0,
        }
    }
}

impl SyncConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn fetch_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.fetch_retry_backoff_ms)
    }

    /// Start height for a run that wasn't given one.
    pub fn default_start(&self, tip: u64) -> u64 {
        tip.saturating_sub(self.lookback_blocks)
    }
}
