//! Bounded retry and polling helpers shared by every collaborator call.

use std::future::Future;
use std::time::Duration;

use heal_core_types::HealError;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retries one collaborator call on transient failures.
///
/// Each attempt is bounded by `call_timeout`; a timed out attempt counts as a
/// transient failure. Non-retryable errors are returned immediately.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
    pub call_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration, call_timeout: Duration) -> Self {
        Self {
            max_retries,
            delay,
            call_timeout,
        }
    }

    /// Run `call` until it succeeds, fails permanently or runs out of
    /// retries. `on_retry` observes every failure that is about to be
    /// retried.
    pub async fn run<T, F, Fut, R>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut call: F,
        mut on_retry: R,
    ) -> Result<T, HealError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, HealError>>,
        R: FnMut(u32, &HealError),
    {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(HealError::Cancelled);
            }
            let current_err = tokio::select! {
                _ = cancel.cancelled() => return Err(HealError::Cancelled),
                outcome = timeout(self.call_timeout, call()) => match outcome {
                    Ok(Ok(value)) => return Ok(value),
                    Ok(Err(err)) => err,
                    Err(_) => HealError::timeout(format!(
                        "{label} timed out after {:?}",
                        self.call_timeout
                    )),
                },
            };

            if !current_err.is_retryable() || attempt >= self.max_retries {
                debug!(
                    target: "heal-orchestrator",
                    call = label,
                    attempts = attempt + 1,
                    error = %current_err,
                    "call failed"
                );
                return Err(current_err);
            }

            attempt += 1;
            warn!(
                target: "heal-orchestrator",
                call = label,
                attempt,
                max_retries = self.max_retries,
                error = %current_err,
                "retrying call"
            );
            on_retry(attempt, &current_err);
            tokio::select! {
                _ = cancel.cancelled() => return Err(HealError::Cancelled),
                _ = sleep(self.delay) => {}
            }
        }
    }
}

/// State reported by one poll of an external task.
#[derive(Clone, Debug, PartialEq)]
pub enum PollStatus<T> {
    Pending,
    Completed(T),
    Failed(String),
}

/// Fixed-interval polling with a bounded number of polls.
#[derive(Clone, Debug, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Poll until the task completes or fails. Running out of polls yields a
    /// [`HealError::Timeout`].
    pub async fn poll_until<T, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut poll: F,
    ) -> Result<T, HealError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<PollStatus<T>, HealError>>,
    {
        for attempt in 1..=self.max_attempts {
            match poll().await? {
                PollStatus::Completed(value) => return Ok(value),
                PollStatus::Failed(reason) => return Err(HealError::new(reason)),
                PollStatus::Pending => {
                    debug!(target: "heal-orchestrator", call = label, attempt, "task pending");
                }
            }
            if attempt < self.max_attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(HealError::Cancelled),
                    _ = sleep(self.interval) => {}
                }
            }
        }
        Err(HealError::timeout(format!(
            "{label} still pending after {} polls",
            self.max_attempts
        )))
    }
}
