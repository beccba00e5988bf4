//! Bounded retry around optimistic writes.
//!
//! Each attempt is a full read-modify-write; the closure re-reads the plant
//! so a retry always computes from fresh state. Backoff doubles after each
//! conflict. Once the budget is spent the write is abandoned with
//! `SimError::WriteConflict` and the caller revisits the plant on a later
//! tick.

use crate::error::SimError;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Result of one write attempt
#[derive(Debug)]
pub enum Commit<T> {
    /// Write landed (or there was nothing to write)
    Done(T),
    /// Version check failed; try again from a fresh read
    Conflict,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each time after
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    100
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff_ms: backoff.as_millis() as u64,
        }
    }

    /// Delay after the `attempt`-th failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

/// Run `attempt` until it commits, fails, or the policy is exhausted.
pub async fn with_conflict_retry<T, F>(
    policy: &RetryPolicy,
    plant_id: &str,
    mut attempt: F,
) -> Result<T, SimError>
where
    F: FnMut() -> Result<Commit<T>, SimError>,
{
    let max_attempts = policy.max_attempts.max(1);

    for n in 1..=max_attempts {
        match attempt()? {
            Commit::Done(value) => return Ok(value),
            Commit::Conflict => {
                debug!(
                    plant_id = %plant_id,
                    attempt = n,
                    max_attempts,
                    "Write conflict"
                );
                if n < max_attempts {
                    tokio::time::sleep(policy.backoff_for(n)).await;
                }
            }
        }
    }

    Err(SimError::WriteConflict {
        plant_id: plant_id.to_string(),
        attempts: max_attempts,
    })
}
