//! Bounded retries with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::RetryConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Additional attempts after the first
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        let max_backoff = secs(config.max_backoff_seconds);
        Self {
            max_retries: config.max_retries,
            backoff_factor: config.backoff_factor.max(1.0),
            initial_backoff: secs(config.initial_backoff_seconds).min(max_backoff),
            max_backoff,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sleep before retry number `attempt` (0-based):
    /// `min(initial * factor^attempt, max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let raw = self.initial_backoff.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(raw)
            .map(|d| d.min(self.max_backoff))
            .unwrap_or(self.max_backoff)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or `max_retries + 1` attempts have failed.
    ///
    /// `operation` receives the 1-based attempt number. `on_retry` is called
    /// with the failed attempt, the upcoming delay and the error before each
    /// backoff sleep. The last error is returned on exhaustion.
    pub async fn retry<T, F, Fut, L>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut operation: F,
        mut on_retry: L,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
        L: FnMut(u32, Duration, &AppError),
    {
        let total = self.max_retries.saturating_add(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            let err = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(err);
            }
            if attempt >= total {
                log::error!("{} failed after {} attempts: {}", label, attempt, err);
                return Err(err);
            }

            let delay = self.delay_for(attempt - 1);
            log::warn!(
                "{} failed (attempt {}/{}): {}. Retrying in {:.1}s...",
                label,
                attempt,
                total,
                err,
                delay.as_secs_f64()
            );
            on_retry(attempt, delay, &err);

            tokio::select! {
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                _ = sleep(delay) => {}
            }
        }
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy::from_config(&RetryConfig {
            max_retries: 3,
            backoff_factor: 2.0,
            initial_backoff_seconds: 2.0,
            max_backoff_seconds: 5.0,
        })
    }

    #[test]
    fn delays_grow_and_cap() {
        let p = policy();
        assert_eq!(p.delay_for(0), Duration::from_secs(2));
        assert_eq!(p.delay_for(1), Duration::from_secs(4));
        assert_eq!(p.delay_for(2), Duration::from_secs(5));
        assert_eq!(p.delay_for(60), Duration::from_secs(5));
        assert_eq!(p.delay_for(u32::MAX), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_operation_runs_r_plus_one_times() {
        let p = policy();
        let calls = &AtomicU32::new(0);
        let mut delays = Vec::new();

        let result: Result<()> = p
            .retry(
                "flaky",
                &CancellationToken::new(),
                |_| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(AppError::fetch("flaky", "connection refused"))
                },
                |_, delay, _| delays.push(delay),
            )
            .await;

        assert!(matches!(result, Err(AppError::Fetch { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(delays.len(), 3);
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let p = policy();
        let start = tokio::time::Instant::now();

        let value = p
            .retry(
                "eventually",
                &CancellationToken::new(),
                |attempt| async move {
                    if attempt < 3 {
                        Err(AppError::fetch("eventually", "503"))
                    } else {
                        Ok(attempt)
                    }
                },
                |_, _, _| {},
            )
            .await
            .unwrap();

        assert_eq!(value, 3);
        // 2s + 4s of backoff on the paused clock
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_returns_immediately() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = policy()
            .retry(
                "parse",
                &CancellationToken::new(),
                |_| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(AppError::parse("page", "bad markup"))
                },
                |_, _, _| {},
            )
            .await;

        assert!(matches!(result, Err(AppError::Parse { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_means_single_attempt() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = policy()
            .with_max_retries(0)
            .retry(
                "once",
                &CancellationToken::new(),
                |_| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(AppError::fetch("once", "timeout"))
                },
                |_, _, _| {},
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_backoff() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let result: Result<()> = policy()
            .retry(
                "cancelled",
                &cancel,
                |_| async { Err(AppError::fetch("cancelled", "reset")) },
                |_, _, _| trigger.cancel(),
            )
            .await;

        assert!(matches!(result, Err(AppError::Cancelled)));
    }
}
