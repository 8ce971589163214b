//! Bounded retry, timeout and cancellation around blocking backend calls.
//!
//! Embedders and generators are synchronous. Each attempt runs on the
//! blocking pool and is raced against the timeout and the caller's
//! cancellation token; a timeout counts as `BackendUnavailable`.
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::BackendConfig;
use crate::error::{RagError, Result};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// No retries, for callers that handle failures themselves.
    #[must_use]
    pub fn once(timeout: Duration) -> Self {
        Self {
            timeout,
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }
}

impl From<BackendConfig> for RetryPolicy {
    fn from(config: BackendConfig) -> Self {
        Self {
            timeout: config.timeout(),
            max_retries: config.max_retries,
            backoff: config.backoff(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        BackendConfig::default().into()
    }
}

/// Run `op` on the blocking pool, retrying retryable failures up to
/// `policy.max_retries` times with linear backoff.
///
/// Cancellation returns immediately; an attempt already running on the
/// blocking pool finishes on its own and its result is discarded.
pub async fn call<T, F>(
    label: &'static str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    op: F,
) -> Result<T>
where
    T: Send + 'static,
    F: Fn() -> Result<T> + Clone + Send + 'static,
{
    let mut attempt = 0u32;
    loop {
        let task = tokio::task::spawn_blocking(op.clone());
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(RagError::Cancelled),
            res = tokio::time::timeout(policy.timeout, task) => match res {
                Err(_) => Err(RagError::BackendUnavailable(format!(
                    "{label} timed out after {:?}",
                    policy.timeout
                ))),
                Ok(Err(join)) => Err(RagError::Backend(format!(
                    "{label} task failed: {join}"
                ))),
                Ok(Ok(result)) => result,
            },
        };

        match outcome {
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.backoff * attempt;
                warn!(%err, attempt, ?delay, "{label} failed, retrying");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(RagError::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
            }
            other => return other,
        }
    }
}
