//! Bounded exponential-backoff retry

use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const MAX_BACKOFF_MS: u64 = 60_000;

/// Retry budget for one supervised step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry; doubles on each subsequent retry
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay_ms: base_delay.as_millis() as u64,
        }
    }

    /// Delay before retry `attempt` (0-based): `base × 2^attempt`, capped at 60s
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = 2u64.saturating_pow(attempt);
        let total_ms = self.base_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(total_ms.min(MAX_BACKOFF_MS))
    }
}

/// Terminal failure of a supervised step
#[derive(Debug)]
pub struct RetryError<E> {
    /// Attempts actually made
    pub attempts: u32,
    pub last_message: String,
    /// Error from the final attempt
    pub source: E,
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        self.source
    }
}

impl<E> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed after {} attempt(s): {}",
            self.attempts, self.last_message
        )
    }
}

impl<E: StdError + 'static> StdError for RetryError<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.source)
    }
}

/// Default predicate: every failure is worth another attempt
pub fn always_retryable<E>(_: &E) -> bool {
    true
}

/// Wraps a fallible async step with bounded retries
#[derive(Debug, Clone, Default)]
pub struct RetrySupervisor {
    policy: RetryPolicy,
    cancel: Option<CancellationToken>,
}

impl RetrySupervisor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            cancel: None,
        }
    }

    /// Stop waiting between attempts once `token` is cancelled
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run `step` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent. `step` receives the 0-based attempt number.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        label: &str,
        mut step: F,
        is_retryable: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0u32;
        loop {
            let err = match step(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(label, attempts = attempt + 1, "step succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let attempts = attempt + 1;
            let give_up = |err: E| RetryError {
                attempts,
                last_message: err.to_string(),
                source: err,
            };

            if !is_retryable(&err) {
                debug!(label, attempts, error = %err, "non-retryable failure");
                return Err(give_up(err));
            }
            if attempt >= self.policy.max_retries {
                warn!(label, attempts, error = %err, "retry budget exhausted");
                return Err(give_up(err));
            }

            let delay = self.policy.delay_for(attempt);
            warn!(
                label,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "step failed, retrying"
            );

            match &self.cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => return Err(give_up(err)),
                        _ = sleep(delay) => {}
                    }
                }
                None => sleep(delay).await,
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::time::Instant;

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct StepError(&'static str);

    #[test]
    fn delays_double_and_cap() {
        let policy = RetryPolicy::new(10, Duration::from_millis(500));
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(12), Duration::from_millis(60_000));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(60_000));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_attempted_n_plus_one_times() {
        let supervisor = RetrySupervisor::new(RetryPolicy::new(3, Duration::from_millis(100)));
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let started = Instant::now();

        let recorded = stamps.clone();
        let result: Result<(), _> = supervisor
            .run(
                "always-fails",
                move |_| {
                    let recorded = recorded.clone();
                    async move {
                        recorded.lock().push(started.elapsed());
                        Err(StepError("boom"))
                    }
                },
                always_retryable,
            )
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 4);
        assert_eq!(err.last_message, "boom");

        let stamps = stamps.lock().clone();
        let gaps: Vec<u128> = stamps
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).as_millis())
            .collect();
        assert_eq!(gaps, vec![100, 200, 400]);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_failure_stops_immediately() {
        let supervisor = RetrySupervisor::default();
        let calls = Arc::new(Mutex::new(0u32));
        let counter = calls.clone();
        let result: Result<(), _> = supervisor
            .run(
                "domain",
                move |_| {
                    *counter.lock() += 1;
                    async { Err(StepError("login required")) }
                },
                |_: &StepError| false,
            )
            .await;
        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(*calls.lock(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failure() {
        let supervisor = RetrySupervisor::default();
        let value = supervisor
            .run(
                "flaky",
                |attempt| async move {
                    if attempt == 0 {
                        Err(StepError("transient"))
                    } else {
                        Ok(attempt)
                    }
                },
                always_retryable,
            )
            .await
            .unwrap();
        assert_eq!(value, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_cuts_backoff_short() {
        let token = CancellationToken::new();
        let supervisor = RetrySupervisor::new(RetryPolicy::new(5, Duration::from_secs(10)))
            .cancel_on(token.clone());
        let canceller = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });
        let started = Instant::now();
        let result: Result<(), _> = supervisor
            .run("cancelled", |_| async { Err(StepError("nope")) }, always_retryable)
            .await;
        assert_eq!(result.unwrap_err().attempts, 1);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
