//! Timeout and bounded retry around store calls.

use crate::config::RetryConfig;
use crate::error::SubmissionError;
use inviteflow_storage::StorageError;
use std::future::Future;
use std::time::Duration;

/// Retry budget applied to every store call the engine makes.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub call_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            call_timeout: Duration::from_millis(config.call_timeout_ms),
        }
    }

    /// Runs `call` until it succeeds, fails permanently or the attempt
    /// budget runs out. A call exceeding the timeout counts as a transient
    /// failure.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        target: &str,
        mut call: F,
    ) -> Result<T, SubmissionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        let mut attempts = 0;
        let mut backoff = self.initial_backoff;

        loop {
            attempts += 1;
            let outcome = match tokio::time::timeout(self.call_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(StorageError::timeout(
                    operation,
                    u64::try_from(self.call_timeout.as_millis()).unwrap_or(u64::MAX),
                )),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempts < self.max_attempts => {
                    tracing::warn!(
                        operation,
                        object = target,
                        attempt = attempts,
                        max_attempts = self.max_attempts,
                        error = %e,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        "Store call failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2); // Exponential backoff
                }
                Err(e) => {
                    return Err(SubmissionError {
                        operation: operation.to_string(),
                        target: target.to_string(),
                        attempts,
                        source: e,
                    });
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
