//! Retry policy for transactional units of work

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded retry with capped exponential backoff
///
/// | Attempt | Backoff before next attempt |
/// |---------|-----------------------------|
/// | 1 | `initial_backoff_ms` |
/// | 2 | `2 * initial_backoff_ms` |
/// | n | `min(2^(n-1) * initial, max_backoff_ms)` |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Backoff after the first failed attempt
    pub initial_backoff_ms: u64,
    /// Upper bound on any single backoff
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    /// Backoff to wait after failed attempt number `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 10,
            max_backoff_ms: 500,
        }
    }
}
