//! Bounded exponential backoff for provider calls.
//!
//! Every external call goes through [`call_with_retry`], which
//! - takes a permit from the shared call limiter (API rate limits),
//! - bounds the call with a timeout,
//! - retries retriable failures with exponential backoff, releasing the
//!   permit while it sleeps.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::ProviderError;

/// Retry policy for transient provider failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,
    /// Initial backoff delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Backoff multiplier (e.g., 2.0 for exponential).
    pub backoff_multiplier: f64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    /// Calculate the backoff delay for a given attempt number (0-indexed).
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        if attempt == 0 {
            return 0;
        }
        let delay =
            self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32 - 1);
        (delay as u64).min(self.max_backoff_ms)
    }

    /// Whether another retry is allowed given the attempt count.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Get the backoff as a Duration for a given attempt.
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms(attempt))
    }

    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

impl Default for RetryPolicy {
    /// Default: 3 retries, 500ms initial backoff, 2x multiplier, 8s max.
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 8_000,
        }
    }
}

/// Run `call` until it succeeds, fails permanently, or retries run out.
pub async fn call_with_retry<T, F, Fut>(
    operation: &str,
    policy: &RetryPolicy,
    timeout: Duration,
    limiter: &Semaphore,
    mut call: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt: u32 = 0;
    loop {
        let result = {
            let _permit = limiter
                .acquire()
                .await
                .map_err(|_| ProviderError::permanent(operation, "call limiter closed"))?;
            match tokio::time::timeout(timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::timeout(
                    operation,
                    format!("no response within {}ms", timeout.as_millis()),
                )),
            }
        };

        match result {
            Ok(value) => {
                if attempt > 0 {
                    debug!(operation, attempt, "provider call recovered after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retriable() && policy.should_retry(attempt) => {
                attempt += 1;
                let backoff = policy.backoff_duration(attempt);
                warn!(
                    operation,
                    attempt,
                    max_retries = policy.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "provider call failed, retrying"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}
