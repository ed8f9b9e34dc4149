//! Retry executor with exponential backoff
//!
//! Runs a processing-hook operation up to `max_attempts` times, sleeping an
//! exponentially growing interval (capped at `max_interval`) between
//! attempts. Every failure retries uniformly; the executor has no
//! transient/permanent classification.
//!
//! Cancelling the supplied token while the executor sleeps aborts the retry
//! loop immediately with [`Error::InterruptedDuringBackoff`]; the remaining
//! attempts are abandoned and the interruption does not count as a failure.
//!
//! # Example
//!
//! ```no_run
//! use fileferry::config::RetryConfig;
//! use fileferry::retry::{RetryContext, run_with_retry};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> fileferry::Result<()> {
//! let policy = RetryConfig::default();
//! let cancel = CancellationToken::new();
//! let value = run_with_retry(
//!     &policy,
//!     RetryContext { server: "alpha", operation: "before_upload" },
//!     &cancel,
//!     || async { Ok::<_, fileferry::Error>(42) },
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::error::{Error, Result};

/// Diagnostic labels attached to retry failures
///
/// Used only for logging and for the context carried by
/// [`Error::RetryExhausted`]; the executor never branches on it.
#[derive(Clone, Copy, Debug)]
pub struct RetryContext<'a> {
    /// Owning server name
    pub server: &'a str,
    /// Operation label (e.g., "after_download")
    pub operation: &'a str,
}

/// Execute an operation with bounded exponential-backoff retries
///
/// Attempt 1 runs immediately. After a failure with attempts remaining, the
/// executor sleeps the current interval, multiplies it by the policy's
/// `multiplier` (capped at `max_interval`), and tries again. The wait
/// preceding attempt `k` is `min(initial_interval × multiplier^(k−1),
/// max_interval)`.
///
/// After `max_attempts` failed attempts the executor returns
/// [`Error::RetryExhausted`] carrying the attempt count, the context labels,
/// and the last underlying error.
pub async fn run_with_retry<F, Fut, T>(
    policy: &RetryConfig,
    ctx: RetryContext<'_>,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut interval = policy.initial_interval;
    let mut last_error: Option<Error> = None;

    for attempt in 1..=policy.max_attempts {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(
                        server = ctx.server,
                        operation = ctx.operation,
                        attempts = attempt,
                        "operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(e) => {
                tracing::warn!(
                    server = ctx.server,
                    operation = ctx.operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "operation failed"
                );
                last_error = Some(e);

                if attempt < policy.max_attempts {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {}
                        _ = cancel.cancelled() => {
                            tracing::warn!(
                                server = ctx.server,
                                operation = ctx.operation,
                                "cancelled during backoff, abandoning remaining attempts"
                            );
                            return Err(Error::InterruptedDuringBackoff {
                                server: ctx.server.to_owned(),
                                operation: ctx.operation.to_owned(),
                            });
                        }
                    }
                    interval = next_interval(interval, policy);
                }
            }
        }
    }

    Err(Error::RetryExhausted {
        attempts: policy.max_attempts,
        server: ctx.server.to_owned(),
        operation: ctx.operation.to_owned(),
        source: Box::new(
            last_error.unwrap_or_else(|| Error::Other("operation never ran".into())),
        ),
    })
}

/// Next backoff interval: multiply, then cap at the policy maximum
fn next_interval(current: Duration, policy: &RetryConfig) -> Duration {
    Duration::from_secs_f64(current.as_secs_f64() * policy.multiplier).min(policy.max_interval)
}
