//! Retry/Backoff Policy
//!
//! Wraps calls to external collaborators with bounded retries, exponential
//! backoff with full jitter, and a per-attempt read deadline. Every network
//! call in the pipeline goes through one shared policy instance.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

// =============================================================================
// Configuration
// =============================================================================

/// Retry policy configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts per wrapped call (first call included)
    pub max_attempts: u32,
    /// Base delay for exponential backoff (milliseconds)
    pub base_delay_ms: u64,
    /// Backoff delay ceiling (milliseconds)
    pub max_delay_ms: u64,
    /// Connection establishment budget, forwarded to client implementations
    pub connect_timeout_ms: u64,
    /// Per-attempt deadline enforced around the wrapped call
    pub read_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay_ms: 1_000,
            max_delay_ms: 20_000,
            connect_timeout_ms: 5_000,
            read_timeout_ms: 10_000,
        }
    }
}

// =============================================================================
// Retry Policy
// =============================================================================

/// Executes operations against external collaborators with bounded retries.
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `op` with the default transience classification
    /// ([`Error::is_transient`]).
    pub async fn execute<F, Fut, T>(&self, operation: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_classified(operation, op, Error::is_transient)
            .await
    }

    /// Runs `op` up to `max_attempts` times. Each attempt is bounded by the
    /// read deadline; failures classified retryable by `is_retryable` are
    /// retried after a jittered backoff delay, everything else surfaces
    /// immediately. Exhausting the budget surfaces the last error wrapped in
    /// [`Error::RetriesExhausted`].
    pub async fn execute_classified<F, Fut, T, C>(
        &self,
        operation: &str,
        op: F,
        is_retryable: C,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
        C: Fn(&Error) -> bool,
    {
        let deadline = Duration::from_millis(self.config.read_timeout_ms);
        let mut last_error = None;

        for attempt in 0..self.config.max_attempts {
            let attempt_result = match tokio::time::timeout(deadline, op()).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout {
                    operation: operation.to_string(),
                    timeout_ms: self.config.read_timeout_ms,
                }),
            };

            match attempt_result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !is_retryable(&e) {
                        return Err(e);
                    }
                    if attempt + 1 == self.config.max_attempts {
                        last_error = Some(e);
                        break;
                    }

                    let delay = self.backoff_delay(attempt);
                    warn!(
                        "{} attempt {} failed, retrying in {}ms: {}",
                        operation,
                        attempt + 1,
                        delay.as_millis(),
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
            }
        }

        Err(Error::RetriesExhausted {
            attempts: self.config.max_attempts,
            source: Box::new(last_error.unwrap_or_else(|| {
                Error::Internal(format!("{operation} failed without an error"))
            })),
        })
    }

    /// Full-jitter exponential backoff: uniform in [0, min(base * 2^n, cap)].
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let ceiling = self
            .config
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(self.config.max_delay_ms);
        let jittered = rand::thread_rng().gen_range(0..=ceiling);
        Duration::from_millis(jittered)
    }
}
