//! Readiness polling and transient-error retry (exponential backoff)

use crate::error::{CloudError, Operation, Result};
use crate::provider::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Outcome of one readiness probe
#[derive(Debug, Clone, PartialEq)]
pub enum Probe<T> {
    /// Target reached
    Ready(T),
    /// Not there yet; carries the observed status for logging
    Pending(String),
    /// The remote system reported a terminal failure
    Failed(String),
}

/// Poll `probe` until it reports ready
///
/// Retryable errors count as pending. Gives up with
/// [`CloudError::Timeout`] once `timeout` has elapsed or
/// `poll.max_attempts` probes were made, whichever comes first. Nothing
/// is rolled back on timeout.
pub async fn wait_for<T, F, Fut>(
    target: &str,
    resource_id: &str,
    poll: &RetryConfig,
    timeout: Duration,
    mut probe: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Probe<T>>>,
{
    let started = Instant::now();
    let deadline = started + timeout;
    let mut attempt: u32 = 0;

    loop {
        match probe().await {
            Ok(Probe::Ready(value)) => {
                tracing::debug!(resource_id, goal = target, attempt, "reached target");
                return Ok(value);
            }
            Ok(Probe::Pending(status)) => {
                tracing::debug!(resource_id, goal = target, %status, attempt, "not ready yet");
            }
            Ok(Probe::Failed(reason)) => {
                return Err(CloudError::Provisioning {
                    resource_id: resource_id.to_string(),
                    reason,
                });
            }
            Err(e) if e.is_retryable() => {
                tracing::debug!(resource_id, goal = target, error = %e, "transient error while waiting");
            }
            Err(e) => return Err(e),
        }

        attempt = attempt.saturating_add(1);
        let now = Instant::now();
        if now >= deadline || attempt >= poll.max_attempts {
            return Err(CloudError::Timeout {
                resource_id: resource_id.to_string(),
                target: target.to_string(),
                elapsed: now - started,
            });
        }

        sleep(poll.delay_for_attempt(attempt - 1).min(deadline - now)).await;
    }
}

/// Issue `call`, retrying retryable failures with backoff
///
/// The final error carries `operation` and `resource_id` as context.
pub async fn retry_transient<T, F, Fut>(
    retry: &RetryConfig,
    operation: Operation,
    resource_id: &str,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < retry.max_attempts => {
                let delay = retry.delay_for_attempt(attempt);
                tracing::warn!(
                    resource_id,
                    %operation,
                    error = %e,
                    "retrying in {:?} ({}/{})",
                    delay,
                    attempt + 1,
                    retry.max_attempts
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e.context(operation, resource_id)),
        }
    }
}
