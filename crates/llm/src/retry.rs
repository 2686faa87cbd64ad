use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{error, warn};

use crate::error::GenerationError;
use crate::{Generator, LlmRequest, LlmResponse};

/// Exponential backoff with random jitter for transient generation failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    /// Upper bound of the uniform jitter added to every delay.
    pub max_jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            max_jitter_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based), before jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(1u64 << exponent))
    }

    fn delay_for(&self, attempt: u32, err: &GenerationError) -> Duration {
        let base = match err.retry_after() {
            Some(hint) => hint.max(self.backoff(attempt)),
            None => self.backoff(attempt),
        };
        base + jitter(self.max_jitter_ms)
    }

    /// Calls `generator` until it succeeds, a non-retryable error occurs, or
    /// `max_attempts` is exhausted. The last error is returned unchanged.
    pub async fn run<G>(&self, generator: &G, req: &LlmRequest) -> Result<LlmResponse, GenerationError>
    where
        G: Generator + ?Sized,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match generator.generate(req).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };
            if !err.is_retryable() {
                error!(attempt, "generation failed: {err}");
                return Err(err);
            }
            if attempt >= max_attempts {
                error!(attempts = attempt, "generation failed after retries: {err}");
                return Err(err);
            }
            let delay = self.delay_for(attempt, &err);
            warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "transient generation failure, retrying: {err}"
            );
            sleep(delay).await;
        }
    }
}

fn jitter(max_ms: u64) -> Duration {
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis((rand::random::<f64>() * max_ms as f64) as u64)
}
