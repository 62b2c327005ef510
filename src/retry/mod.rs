//! Retry module for bounding the cost of failed fetches
//!
//! This module contains:
//! - Error classification (`ErrorKind`) shared by every fetch path
//! - The exponential backoff policy with jitter
//! - An async driver that applies the policy to a fetch operation

mod policy;

pub use policy::{next_delay, should_retry, unjittered_delay, ErrorKind, RetryPolicy};

use crate::scrape::{FetchError, FetchResult};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Result of driving one operation through the retry policy
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// The operation eventually succeeded
    Success {
        /// The value produced by the successful attempt
        value: T,
        /// Total number of attempts made, including the successful one
        attempts: u32,
    },

    /// The operation failed and no further attempt is allowed
    Exhausted {
        /// The error from the last attempt
        error: FetchError,
        /// Total number of attempts made
        attempts: u32,
    },

    /// A stop signal arrived while waiting to retry
    Cancelled {
        /// The error that triggered the interrupted backoff
        error: FetchError,
        /// Total number of attempts made before cancellation
        attempts: u32,
    },
}

impl<T> RetryOutcome<T> {
    /// Number of attempts made, whatever the outcome
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Success { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// Number of attempts beyond the first one
    pub fn retries(&self) -> u32 {
        self.attempts().saturating_sub(1)
    }
}

/// Runs `op` until it succeeds or the policy refuses another attempt
///
/// Every attempt is bounded by `timeout`; an expired attempt is classified as
/// [`ErrorKind::Transient`]. The in-flight attempt is always awaited to
/// completion, but the backoff wait between attempts is abandoned as soon as
/// `cancel` fires.
///
/// # Arguments
///
/// * `policy` - Retry bound and backoff parameters
/// * `timeout` - Upper bound for a single attempt
/// * `cancel` - Stop signal for the surrounding run
/// * `label` - Human-readable name of the operation, used in logs
/// * `op` - Factory producing one attempt's future
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    timeout: Duration,
    cancel: &CancellationToken,
    label: &str,
    mut op: F,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = FetchResult<T>>,
{
    let mut attempts: u32 = 0;

    loop {
        let result = match tokio::time::timeout(timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::transient(format!(
                "timed out after {}ms",
                timeout.as_millis()
            ))),
        };
        attempts += 1;

        let error = match result {
            Ok(value) => return RetryOutcome::Success { value, attempts },
            Err(e) => e,
        };

        if !policy.should_retry(error.kind, attempts) {
            if error.kind.is_transient() {
                tracing::warn!(
                    "{}: giving up after {} attempts: {}",
                    label,
                    attempts,
                    error
                );
            } else {
                tracing::warn!("{}: {} error, not retrying: {}", label, error.kind, error);
            }
            return RetryOutcome::Exhausted { error, attempts };
        }

        let delay = policy.delay_for(attempts - 1);
        tracing::warn!(
            "{}: attempt {}/{} failed: {} (retrying in {:.1}s)",
            label,
            attempts,
            policy.max_retries,
            error,
            delay.as_secs_f64()
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {
                tracing::info!("{}: stop requested during backoff", label);
                return RetryOutcome::Cancelled { error, attempts };
            }
        }
    }
}
