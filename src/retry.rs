//! Bounded retry with exponential backoff and jitter.
//!
//! Only errors that classify themselves as retriable are retried. The
//! executor is a plain value handed to whoever needs it; it carries the
//! policy and the cancellation token that aborts pending waits.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Classification hook for errors passed through a [`RetryExecutor`].
pub trait Retriable {
    fn is_retriable(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `attempt + 1`, without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

#[derive(Debug, Error)]
pub enum RetryError<E: fmt::Display> {
    #[error("{0}")]
    Permanent(E),

    #[error("giving up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("cancelled after {attempts} attempts, last error: {last}")]
    Cancelled { attempts: u32, last: E },
}

impl<E: fmt::Display> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Permanent(err) => err,
            RetryError::Exhausted { last, .. } => last,
            RetryError::Cancelled { last, .. } => last,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self { policy, cancel }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, fails permanently, runs out of attempts
    /// or the cancellation token fires while waiting.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        E: Retriable + fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retriable() {
                return Err(RetryError::Permanent(err));
            }

            if attempt >= self.policy.max_attempts {
                warn!("operation failed after {attempt} attempts: {err}");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            let delay = self.jittered(self.policy.backoff(attempt));
            debug!("attempt {attempt} failed ({err}), retrying in {delay:?}");

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(RetryError::Cancelled {
                        attempts: attempt,
                        last: err,
                    });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        let spread = delay.as_millis() as u64 / 4;
        if spread == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}
