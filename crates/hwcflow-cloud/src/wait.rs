//! Status poller for long-running remote operations
//!
//! [`StateChangeConf`] repeatedly calls a refresh function until the
//! reported state reaches one of the target states, an unexpected state is
//! seen, the resource keeps disappearing, or the timeout elapses.

use crate::error::BoxError;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Outcome of one refresh call: the object (if it exists) and its state
pub type RefreshResult<T> = std::result::Result<(Option<T>, String), BoxError>;

const DEFAULT_NOT_FOUND_CHECKS: usize = 20;
const INITIAL_WAIT: Duration = Duration::from_millis(100);
const MAX_WAIT: Duration = Duration::from_secs(10);
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(180);

#[derive(Error, Debug)]
pub enum WaitError {
    #[error(
        "timeout while waiting for state to become '{}' (last state: '{}', timeout: {:?})",
        .expected.join(", "), .last_state, .timeout
    )]
    Timeout {
        last_state: String,
        expected: Vec<String>,
        timeout: Duration,
    },

    #[error("unexpected state '{}', wanted target '{}'", .state, .expected.join(", "))]
    UnexpectedState { state: String, expected: Vec<String> },

    #[error("couldn't find resource ({retries} retries)")]
    NotFound { retries: usize },

    #[error("{0}")]
    Refresh(BoxError),
}

impl WaitError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::Timeout { .. })
    }

    /// The error returned by the refresh function, if that is what stopped the wait
    pub fn refresh_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            WaitError::Refresh(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

/// Polling configuration
#[derive(Debug, Clone)]
pub struct StateChangeConf {
    /// States that mean "keep waiting"
    pub pending: Vec<String>,
    /// States that mean "done"
    pub target: Vec<String>,
    /// Overall deadline, including the initial delay
    pub timeout: Duration,
    /// Sleep before the first refresh
    pub delay: Duration,
    /// Lower bound of the wait between refreshes
    pub min_timeout: Duration,
    /// Fixed wait between refreshes; only honoured in (0, 180s)
    pub poll_interval: Duration,
    /// Consecutive "not found" results tolerated
    pub not_found_checks: usize,
    /// Consecutive target hits required
    pub continuous_target_occurence: usize,
}

impl StateChangeConf {
    pub fn new<P, T>(pending: P, target: T) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            pending: pending.into_iter().map(Into::into).collect(),
            target: target.into_iter().map(Into::into).collect(),
            timeout: Duration::from_secs(600),
            delay: Duration::ZERO,
            min_timeout: Duration::ZERO,
            poll_interval: Duration::ZERO,
            not_found_checks: DEFAULT_NOT_FOUND_CHECKS,
            continuous_target_occurence: 1,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn min_timeout(mut self, min_timeout: Duration) -> Self {
        self.min_timeout = min_timeout;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn not_found_checks(mut self, checks: usize) -> Self {
        self.not_found_checks = checks;
        self
    }

    pub fn continuous_target_occurence(mut self, occurence: usize) -> Self {
        self.continuous_target_occurence = occurence;
        self
    }

    /// Poll `refresh` until a target state is reached
    ///
    /// Returns the last refreshed object. With an empty target list, a
    /// missing object counts as the target and `Ok(None)` is returned.
    pub async fn wait_for_state<T, F, Fut>(&self, mut refresh: F) -> Result<Option<T>, WaitError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RefreshResult<T>>,
    {
        let not_found_checks = if self.not_found_checks == 0 {
            DEFAULT_NOT_FOUND_CHECKS
        } else {
            self.not_found_checks
        };
        let occurence = self.continuous_target_occurence.max(1);
        let deadline = Instant::now() + self.timeout;

        debug!(
            pending = ?self.pending,
            target = ?self.target,
            timeout = ?self.timeout,
            "Waiting for state"
        );

        let mut last_state = String::new();
        if !self.delay.is_zero() && !sleep_before(deadline, self.delay).await {
            return Err(self.timeout_error(last_state));
        }

        let mut wait = INITIAL_WAIT;
        let mut target_count = 0;
        let mut not_found_count = 0;

        loop {
            let (result, state) = match tokio::time::timeout_at(deadline, refresh()).await {
                Err(_) => return Err(self.timeout_error(last_state)),
                Ok(Err(err)) => return Err(WaitError::Refresh(err)),
                Ok(Ok(outcome)) => outcome,
            };
            trace!(state = %state, found = result.is_some(), "Refreshed");
            last_state = state;

            match result {
                None if self.target.is_empty() => {
                    target_count += 1;
                    if target_count >= occurence {
                        return Ok(None);
                    }
                }
                None => {
                    not_found_count += 1;
                    if not_found_count > not_found_checks {
                        return Err(WaitError::NotFound {
                            retries: not_found_count,
                        });
                    }
                }
                Some(value) => {
                    not_found_count = 0;
                    if self.target.contains(&last_state) {
                        target_count += 1;
                        if target_count >= occurence {
                            return Ok(Some(value));
                        }
                    } else if self.pending.contains(&last_state) {
                        target_count = 0;
                    } else if !self.pending.is_empty() {
                        return Err(WaitError::UnexpectedState {
                            state: last_state,
                            expected: self.target.clone(),
                        });
                    }
                }
            }

            wait = self.next_wait(wait, target_count);
            if !sleep_before(deadline, wait).await {
                return Err(self.timeout_error(last_state));
            }
        }
    }

    /// Wait before the next refresh
    fn next_wait(&self, previous: Duration, target_count: usize) -> Duration {
        let mut wait = previous;
        if target_count == 0 {
            wait *= 2;
        }
        if !self.poll_interval.is_zero() && self.poll_interval < MAX_POLL_INTERVAL {
            return self.poll_interval;
        }
        if wait < self.min_timeout {
            self.min_timeout
        } else if wait > MAX_WAIT {
            MAX_WAIT
        } else {
            wait
        }
    }

    fn timeout_error(&self, last_state: String) -> WaitError {
        WaitError::Timeout {
            last_state,
            expected: self.target.clone(),
            timeout: self.timeout,
        }
    }
}

/// Sleep for `duration` unless the deadline comes first; false when it did
async fn sleep_before(deadline: Instant, duration: Duration) -> bool {
    let wake = Instant::now() + duration;
    if wake >= deadline {
        tokio::time::sleep_until(deadline).await;
        return false;
    }
    tokio::time::sleep_until(wake).await;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sequence(states: &'static [&'static str]) -> impl FnMut() -> std::future::Ready<RefreshResult<usize>> {
        let calls = Arc::new(AtomicUsize::new(0));
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            let state = states[n.min(states.len() - 1)];
            std::future::ready(Ok((Some(n), state.to_string())))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaches_target_after_pending() {
        let conf = StateChangeConf::new(["PENDING"], ["INSERVICE"]);
        let result = conf
            .wait_for_state(sequence(&["PENDING", "PENDING", "INSERVICE"]))
            .await
            .unwrap();
        assert_eq!(result, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_state() {
        let conf = StateChangeConf::new(["CREATING"], ["CONFIGURATION"]);
        let err = conf
            .wait_for_state(sequence(&["CREATING", "CREATE_FAILED"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WaitError::UnexpectedState { ref state, .. } if state == "CREATE_FAILED"
        ));
        assert_eq!(
            err.to_string(),
            "unexpected state 'CREATE_FAILED', wanted target 'CONFIGURATION'"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_state_without_pending_keeps_polling() {
        let conf = StateChangeConf::new(Vec::<String>::new(), ["DONE"]);
        let result = conf
            .wait_for_state(sequence(&["WHATEVER", "OTHER", "DONE"]))
            .await
            .unwrap();
        assert_eq!(result, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_after_checks() {
        let conf = StateChangeConf::new(["PENDING"], ["ACTIVE"]).not_found_checks(2);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let err = conf
            .wait_for_state(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Ok::<(Option<()>, String), BoxError>((None, String::new())))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::NotFound { retries: 3 }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_target_accepts_missing_object() {
        let conf = StateChangeConf::new(["REMOVING"], Vec::<String>::new());
        let result = conf
            .wait_for_state(|| std::future::ready(Ok::<(Option<()>, String), BoxError>((None, String::new()))))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_last_state() {
        let conf = StateChangeConf::new(["PENDING"], ["COMPLETED"])
            .timeout(Duration::from_secs(30))
            .poll_interval(Duration::from_secs(10));
        let start = Instant::now();
        let err = conf.wait_for_state(sequence(&["PENDING"])).await.unwrap_err();
        assert!(err.is_timeout());
        match err {
            WaitError::Timeout {
                last_state,
                expected,
                ..
            } => {
                assert_eq!(last_state, "PENDING");
                assert_eq!(expected, vec!["COMPLETED"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_error_is_returned_immediately() {
        let conf = StateChangeConf::new(["PENDING"], ["COMPLETED"]);
        let err = conf
            .wait_for_state(|| {
                std::future::ready(Err::<(Option<()>, String), BoxError>("boom".into()))
            })
            .await
            .unwrap_err();
        assert!(err.refresh_error().is_some());
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuous_target_occurence_resets_on_pending() {
        let conf = StateChangeConf::new(["PENDING"], ["ACTIVE"]).continuous_target_occurence(2);
        let result = conf
            .wait_for_state(sequence(&["ACTIVE", "PENDING", "ACTIVE", "ACTIVE"]))
            .await
            .unwrap();
        assert_eq!(result, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_before_first_refresh() {
        let conf = StateChangeConf::new(["PENDING"], ["ACTIVE"]).delay(Duration::from_secs(20));
        let start = Instant::now();
        conf.wait_for_state(sequence(&["ACTIVE"])).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(20));
    }

    #[test]
    fn test_next_wait_bounds() {
        let conf = StateChangeConf::new(["PENDING"], ["ACTIVE"]);
        assert_eq!(conf.next_wait(INITIAL_WAIT, 0), Duration::from_millis(200));
        assert_eq!(conf.next_wait(Duration::from_secs(8), 0), MAX_WAIT);
        assert_eq!(conf.next_wait(Duration::from_millis(400), 1), Duration::from_millis(400));

        let bounded = conf.clone().min_timeout(Duration::from_secs(3));
        assert_eq!(bounded.next_wait(INITIAL_WAIT, 0), Duration::from_secs(3));

        let fixed = conf.clone().poll_interval(Duration::from_secs(10));
        assert_eq!(fixed.next_wait(INITIAL_WAIT, 0), Duration::from_secs(10));

        // Too long to be honoured as a fixed interval
        let too_long = conf.poll_interval(Duration::from_secs(20 * 600));
        assert_eq!(too_long.next_wait(Duration::from_secs(8), 0), MAX_WAIT);
    }
}
