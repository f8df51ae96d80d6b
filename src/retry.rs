//! Bounded retry with jittered exponential backoff.
//!
//! Every await step in the workflows polls through [`retry`]. The helper knows
//! nothing about the operation it repeats; the operation decides whether a
//! failure is worth retrying by returning [`RetryError::Transient`] or
//! [`RetryError::Stop`].

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::debug;

/// Failure returned by a retried operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RetryError<E> {
    /// The failure may clear up; try again while attempts remain.
    Transient(E),
    /// The failure is permanent; stop immediately and return the inner error.
    Stop(E),
}

impl<E> From<E> for RetryError<E> {
    fn from(value: E) -> Self {
        Self::Transient(value)
    }
}

/// Attempt budget and initial backoff for [`retry`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of invocations of the operation.
    pub attempts: u32,
    /// Pause before the second attempt; doubled after every failure.
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            attempts,
            initial_backoff,
        }
    }
}

/// Invokes `operation` until it succeeds, stops, or runs out of attempts.
///
/// After a transient failure with attempts remaining, the helper sleeps for
/// `backoff + jitter` where `jitter` is drawn uniformly from
/// `[0, backoff / 2]`, then doubles `backoff`. A budget of zero still invokes
/// the operation once.
///
/// # Errors
///
/// Returns the inner error of a [`RetryError::Stop`] immediately, or the last
/// transient error once the budget is exhausted.
pub async fn retry<T, E, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RetryError<E>>>,
{
    let mut remaining = policy.attempts;
    let mut backoff = policy.initial_backoff;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(RetryError::Stop(err)) => return Err(err),
            Err(RetryError::Transient(err)) => {
                remaining = remaining.saturating_sub(1);
                if remaining == 0 {
                    return Err(err);
                }
                let pause = backoff.saturating_add(jitter(backoff));
                debug!(remaining, pause_ms = pause.as_millis(), "retrying after failure");
                sleep(pause).await;
                backoff = backoff.saturating_mul(2);
            }
        }
    }
}

fn jitter(backoff: Duration) -> Duration {
    let ceiling = u64::try_from((backoff / 2).as_nanos()).unwrap_or(u64::MAX);
    if ceiling == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(rand::rng().random_range(0..=ceiling))
}
