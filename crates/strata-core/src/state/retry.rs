//! Retry-with-backoff for optimistic-concurrency conflicts.
//!
//! The store itself never retries. Callers that want to wrap a
//! read-modify-write cycle use [`retry_on_conflict`]: the closure is re-run
//! (and should re-read) each time it fails with [`StateError::Conflict`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::StateError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
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

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based): exponential, capped.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(32);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Run `op` until it succeeds, fails with a non-conflict error, or the
/// attempt budget is spent. `op` receives the 1-based attempt number.
pub async fn retry_on_conflict<T, F>(policy: &RetryPolicy, mut op: F) -> Result<T, StateError>
where
    F: FnMut(u32) -> Result<T, StateError>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Err(StateError::Conflict {
                key,
                expected_version,
                actual_version,
            }) if attempt < max_attempts => {
                let delay = policy.backoff_for(attempt);
                debug!(
                    key = %key,
                    expected_version,
                    actual_version,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after version conflict"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
