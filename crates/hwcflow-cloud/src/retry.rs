//! Retry helper for operations that fail transiently
//!
//! The operation decides whether an error is worth retrying. Optionally a
//! state check runs before every attempt, so the operation is only tried
//! once the remote object has settled.

use crate::error::BoxError;
use crate::wait::WaitError;
use std::future::{Future, Ready};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

const MIN_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(10);
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(180);

/// Failure of a single attempt
#[derive(Debug)]
pub enum RetryError {
    Retryable(BoxError),
    NonRetryable(BoxError),
}

impl RetryError {
    pub fn retryable(err: impl Into<BoxError>) -> Self {
        RetryError::Retryable(err.into())
    }

    pub fn non_retryable(err: impl Into<BoxError>) -> Self {
        RetryError::NonRetryable(err.into())
    }
}

/// Retry settings
#[derive(Debug, Clone)]
pub struct RetryConf {
    pub timeout: Duration,
    /// Sleep before the first attempt
    pub delay: Duration,
    /// Fixed wait between attempts; exponential backoff when zero
    pub poll_interval: Duration,
    /// States accepted by the pre-attempt check
    pub wait_target: Vec<String>,
    /// States that postpone the attempt
    pub wait_pending: Vec<String>,
}

impl RetryConf {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            delay: Duration::ZERO,
            poll_interval: Duration::ZERO,
            wait_target: Vec::new(),
            wait_pending: Vec::new(),
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn wait_for<P, T>(mut self, pending: P, target: T) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        self.wait_pending = pending.into_iter().map(Into::into).collect();
        self.wait_target = target.into_iter().map(Into::into).collect();
        self
    }

    fn next_wait(&self, previous: Duration) -> Duration {
        if !self.poll_interval.is_zero() && self.poll_interval < MAX_POLL_INTERVAL {
            return self.poll_interval;
        }
        (previous * 2).clamp(MIN_BACKOFF, MAX_BACKOFF)
    }
}

type NoStateCheck = fn() -> Ready<Result<String, BoxError>>;

/// Call `op` until it succeeds, fails permanently or the timeout elapses
///
/// On timeout the last retryable error is returned.
pub async fn retry<T, F, Fut>(conf: &RetryConf, op: F) -> Result<T, BoxError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RetryError>>,
{
    run::<T, NoStateCheck, Ready<Result<String, BoxError>>, F, Fut>(conf, None, op).await
}

/// Like [`retry`], but each attempt first waits for `state` to report a
/// state in `conf.wait_target`
pub async fn retry_with_wait_for_state<T, W, WFut, F, Fut>(
    conf: &RetryConf,
    state: W,
    op: F,
) -> Result<T, BoxError>
where
    W: FnMut() -> WFut,
    WFut: Future<Output = Result<String, BoxError>>,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RetryError>>,
{
    run(conf, Some(state), op).await
}

async fn run<T, W, WFut, F, Fut>(conf: &RetryConf, mut state: Option<W>, mut op: F) -> Result<T, BoxError>
where
    W: FnMut() -> WFut,
    WFut: Future<Output = Result<String, BoxError>>,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RetryError>>,
{
    let deadline = Instant::now() + conf.timeout;
    let mut last_error: Option<BoxError> = None;
    let mut last_state = String::new();
    let mut wait = MIN_BACKOFF / 2;

    if !conf.delay.is_zero() {
        tokio::time::sleep_until(deadline.min(Instant::now() + conf.delay)).await;
    }

    let mut attempt = 0u32;
    loop {
        if Instant::now() >= deadline {
            break;
        }
        attempt += 1;

        let ready = match state.as_mut() {
            None => true,
            Some(check) => {
                let current = check().await?;
                let ready = conf.wait_target.contains(&current);
                if !ready && !conf.wait_pending.contains(&current) {
                    return Err(format!("unexpected status: {}", current).into());
                }
                last_state = current;
                ready
            }
        };

        if ready {
            match op().await {
                Ok(value) => return Ok(value),
                Err(RetryError::NonRetryable(err)) => return Err(err),
                Err(RetryError::Retryable(err)) => {
                    debug!(attempt, error = %err, "Retrying operation");
                    last_error = Some(err);
                }
            }
        }

        wait = conf.next_wait(wait);
        let wake = Instant::now() + wait;
        if wake >= deadline {
            tokio::time::sleep_until(deadline).await;
            break;
        }
        tokio::time::sleep_until(wake).await;
    }

    match last_error {
        Some(err) => Err(err),
        None => Err(Box::new(WaitError::Timeout {
            last_state,
            expected: conf.wait_target.clone(),
            timeout: conf.timeout,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let conf = RetryConf::new(Duration::from_secs(60));
        let value = retry(&conf, move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(RetryError::retryable("SCM.0016"))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_stops_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let conf = RetryConf::new(Duration::from_secs(60));
        let err = retry(&conf, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(RetryError::non_retryable("forbidden")) }
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "forbidden");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_last_retryable_error() {
        let conf = RetryConf::new(Duration::from_secs(30)).poll_interval(Duration::from_secs(10));
        let err = retry(&conf, || async {
            Err::<(), _>(RetryError::retryable("still busy"))
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "still busy");
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_state_before_attempt() {
        let checks = Arc::new(AtomicUsize::new(0));
        let counter = checks.clone();
        let conf = RetryConf::new(Duration::from_secs(60)).wait_for(["PENDING"], ["ACTIVE"]);
        let value = retry_with_wait_for_state(
            &conf,
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let state = if n < 2 { "PENDING" } else { "ACTIVE" };
                std::future::ready(Ok::<_, BoxError>(state.to_string()))
            },
            || async { Ok::<_, RetryError>("done") },
        )
        .await
        .unwrap();
        assert_eq!(value, "done");
        assert_eq!(checks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_state_aborts() {
        let conf = RetryConf::new(Duration::from_secs(60)).wait_for(["PENDING"], ["ACTIVE"]);
        let err = retry_with_wait_for_state(
            &conf,
            || std::future::ready(Ok::<_, BoxError>("ERROR".to_string())),
            || async { Ok::<_, RetryError>(()) },
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "unexpected status: ERROR");
    }

    #[test]
    fn test_backoff_bounds() {
        let conf = RetryConf::new(Duration::from_secs(60));
        assert_eq!(conf.next_wait(MIN_BACKOFF / 2), MIN_BACKOFF);
        assert_eq!(conf.next_wait(Duration::from_secs(2)), Duration::from_secs(4));
        assert_eq!(conf.next_wait(Duration::from_secs(8)), MAX_BACKOFF);
    }
}
