//! Bounded retries for lock contention in the external tool.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

use crate::error::ArchiveError;

/// Cap on the exponent so the delay computation cannot overflow.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Exponential backoff with uniform jitter:
/// `delay(attempt) = base * 2^attempt + uniform(0, jitter_max)`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub jitter_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            jitter_max: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Deterministic part of the delay after failed attempt `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(MAX_BACKOFF_EXPONENT);
        self.base_delay.saturating_mul(1_u32 << exponent)
    }

    /// Backoff plus a random jitter in `[0, jitter_max]`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter_micros = u64::try_from(self.jitter_max.as_micros()).unwrap_or(u64::MAX);
        let jitter = if jitter_micros == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(rand::thread_rng().gen_range(0..=jitter_micros))
        };
        self.backoff(attempt).saturating_add(jitter)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` lock failures have been seen.
    ///
    /// `op` receives the 1-based attempt number. Exhaustion is reported as
    /// [`ArchiveError::LockRetriesExhausted`] so it can be told apart from the
    /// tool rejecting the URL.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, ArchiveError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ArchiveError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    if attempt >= max_attempts {
                        error!(
                            target_label = %label,
                            attempts = attempt,
                            "Giving up: archive tool index still locked"
                        );
                        return Err(ArchiveError::LockRetriesExhausted { attempts: attempt });
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        target_label = %label,
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Archive tool index locked, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
