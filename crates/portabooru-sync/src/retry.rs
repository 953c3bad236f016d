//! Retry executor for remote calls
//!
//! Runs a remote operation under a [`RetryPolicy`]. Transient failures
//! (network, 5xx, 429) are retried with exponential backoff plus random
//! jitter; a server-sent `Retry-After` is honoured as a lower bound on the
//! wait. Permanent failures return at once.
//!
//! Waits are interrupted by the cancellation token.

use std::future::Future;
use std::time::Duration;

use portabooru_core::domain::RetryPolicy;
use portabooru_core::ports::RemoteError;
use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Why a retried operation gave up
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RetryFailure {
    /// The remote answered with an error retrying cannot fix
    #[error("{0}")]
    Permanent(RemoteError),

    /// Every allowed attempt failed transiently
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: RemoteError },

    /// The run was cancelled while waiting
    #[error("cancelled")]
    Cancelled,
}

/// Wait before retry number `retry` (0-based) after `error`
pub fn retry_delay(policy: &RetryPolicy, retry: u32, error: &RemoteError) -> Duration {
    let backoff = policy.backoff(retry) + jitter(policy.jitter);
    match error.retry_after() {
        Some(requested) => backoff.max(requested),
        None => backoff,
    }
}

fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

/// Executes `f` until it succeeds, fails permanently, or the policy runs out
///
/// `operation` names the call in log lines.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    operation: &str,
    cancel: &CancellationToken,
    mut f: F,
) -> Result<T, RetryFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut attempts: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryFailure::Cancelled);
        }

        attempts += 1;
        let err = match f().await {
            Ok(value) => {
                if attempts > 1 {
                    info!(operation, attempts, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_transient() {
            return Err(RetryFailure::Permanent(err));
        }
        if !policy.allows_another(attempts) {
            warn!(operation, attempts, error = %err, "Retry budget exhausted");
            return Err(RetryFailure::Exhausted {
                attempts,
                last: err,
            });
        }

        let delay = retry_delay(policy, attempts - 1, &err);
        warn!(
            operation,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Transient error, retrying"
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(RetryFailure::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
