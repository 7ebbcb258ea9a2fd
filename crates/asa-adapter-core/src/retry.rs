// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timeout and bounded-retry wrappers for adapter calls.
//!
//! Every adapter call runs under a timeout so a hung upstream SDK can never
//! pin a worker. Retries are bounded and only fire for transient codes
//! (`timeout_error`, `unavailable`); adapter-reported business errors are
//! surfaced unchanged.

use std::future::Future;
use std::time::Duration;

use asa_error::{AdcpError, AdcpResult};
use tracing::warn;

/// Run a future under a timeout, mapping expiry to `timeout_error`.
///
/// # Errors
///
/// `timeout_error` when the budget elapses; otherwise the future's own
/// error.
pub async fn with_timeout<T, F>(operation: &str, budget: Duration, fut: F) -> AdcpResult<T>
where
    F: Future<Output = AdcpResult<T>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(AdcpError::timeout(format!(
            "{operation} timed out after {} seconds",
            budget.as_secs()
        ))
        .with_detail("operation", operation)
        .with_detail("timeout_secs", budget.as_secs())),
    }
}

/// Bounded retry policy for transient adapter faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Run an operation, retrying transient failures with exponential
    /// backoff. Non-transient errors return immediately.
    ///
    /// # Errors
    ///
    /// The last error once attempts are exhausted.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut f: F) -> AdcpResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AdcpResult<T>>,
    {
        let mut delay = self.base_delay;
        let mut attempt = 1;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) if err.code.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        code = %err.code,
                        "transient adapter failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
