//! Retry with timeout for planner and assessor calls
//!
//! Every attempt is bounded by the per-call timeout and the run deadline;
//! failed attempts back off exponentially with a little jitter until the
//! retry budget or the deadline is spent.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use crate::core::config::RetryConfig;
use crate::core::{PlanexecError, Result};

/// Retry policy for one class of delegated calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f32,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms.max(config.initial_backoff_ms)),
            backoff_multiplier: config.backoff_multiplier.max(1.0),
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        let grown = current.as_millis() as f32 * self.backoff_multiplier;
        Duration::from_millis(grown.round() as u64).min(self.max_backoff)
    }

    fn jittered(backoff: Duration) -> Duration {
        let spread = backoff.as_millis() as u64 / 4;
        if spread == 0 {
            return backoff;
        }
        backoff + Duration::from_millis(rand::rng().random_range(0..=spread))
    }

    /// Run `call` until it succeeds.
    ///
    /// Each attempt gets `min(call_timeout, time left before deadline)`. No
    /// attempt starts, and no backoff sleep runs, past the deadline.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        call_timeout: Duration,
        deadline: Instant,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        let mut backoff = self.initial_backoff;

        loop {
            attempt += 1;
            let budget = call_timeout.min(deadline.saturating_duration_since(Instant::now()));
            let error = match tokio::time::timeout(budget, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_elapsed) => PlanexecError::timeout(operation, budget),
            };

            if attempt > self.max_retries {
                return Err(error);
            }

            let pause = Self::jittered(backoff);
            if Instant::now() + pause >= deadline {
                tracing::warn!(operation, attempt, "no time left before run deadline: {}", error);
                return Err(error);
            }

            tracing::warn!(
                operation,
                attempt,
                max_attempts = self.max_retries + 1,
                "call failed, retrying: {}",
                error
            );
            tokio::time::sleep(pause).await;
            backoff = self.next_backoff(backoff);
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
