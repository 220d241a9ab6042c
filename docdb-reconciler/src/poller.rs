//! Bounded polling for asynchronous convergence.
//!
//! A predicate is invoked on a fixed interval until it yields a value, the
//! deadline passes, or it fails with a non-transient error. The deadline is
//! fixed once, when polling starts. Transient errors count as "not ready".
//!
//! Some mutations are not reflected in the reported status right away. For
//! those, `settle_then_poll` pauses for a named settle interval first.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, warn};

use crate::error::RemoteError;

/// Interval used by every call site.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Result of a completed poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    Ready(T),
    TimedOut,
}

impl<T> PollOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready(_))
    }
}

/// Fixed-interval poller.
#[derive(Debug, Clone, Copy)]
pub struct Poller {
    interval: Duration,
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl Poller {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll `check` until it returns `Some`, or `timeout` elapses.
    ///
    /// `what` names the awaited condition in logs.
    pub async fn poll<F, Fut, T>(
        &self,
        what: &str,
        timeout: Duration,
        mut check: F,
    ) -> Result<PollOutcome<T>, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, RemoteError>>,
    {
        let deadline = Instant::now() + timeout;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match check().await {
                Ok(Some(value)) => {
                    debug!(attempt, "{} is ready", what);
                    return Ok(PollOutcome::Ready(value));
                }
                Ok(None) => debug!(attempt, "Waiting for {}", what),
                Err(e) if e.is_transient() => {
                    warn!(attempt, error = %e, "Transient error while waiting for {}", what);
                }
                Err(e) => return Err(e),
            }

            let next = Instant::now() + self.interval;
            sleep_until(next.min(deadline)).await;
            if Instant::now() >= deadline {
                warn!(attempt, "Timed out after {}s waiting for {}", timeout.as_secs(), what);
                return Ok(PollOutcome::TimedOut);
            }
        }
    }

    /// Pause for a settle interval without checking anything.
    pub async fn settle(&self, what: &str, settle: Duration) {
        if !settle.is_zero() {
            debug!("Settling {}s for {}", settle.as_secs(), what);
            sleep(settle).await;
        }
    }

    /// Pause for `settle`, then poll. The deadline starts after the pause.
    pub async fn settle_then_poll<F, Fut, T>(
        &self,
        what: &str,
        settle: Duration,
        timeout: Duration,
        check: F,
    ) -> Result<PollOutcome<T>, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, RemoteError>>,
    {
        self.settle(what, settle).await;
        self.poll(what, timeout, check).await
    }
}
