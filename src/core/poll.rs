//! Fixed-interval polling with a bounded attempt budget.
//!
//! Shared by the rendezvous and completion stages. There is no backoff or
//! jitter: a probe runs, and if it is not ready the loop sleeps for the
//! interval and tries again, up to `max_attempts` probes in total.
//!
//! Each probe is bounded by `attempt_timeout`; a probe that has not
//! answered in time counts as not ready, so a stalled request can never
//! stretch the loop past its budget.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::warn;

/// Rendezvous reference policy: every 10 seconds, 60 times (10 minutes)
pub const RENDEZVOUS_INTERVAL: Duration = Duration::from_secs(10);
pub const RENDEZVOUS_MAX_ATTEMPTS: u32 = 60;

/// Completion reference policy: every 30 seconds, 10 times (5 minutes)
pub const COMPLETION_INTERVAL: Duration = Duration::from_secs(30);
pub const COMPLETION_MAX_ATTEMPTS: u32 = 10;

/// Shortest per-attempt timeout, used when the interval is shorter
pub const MIN_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

/// Attempt budget and spacing of a polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    /// Longest a single probe may take
    pub attempt_timeout: Duration,
}

impl PollPolicy {
    /// A policy whose attempts time out after one interval
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            attempt_timeout: interval.max(MIN_ATTEMPT_TIMEOUT),
        }
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    pub fn rendezvous() -> Self {
        Self::new(RENDEZVOUS_MAX_ATTEMPTS, RENDEZVOUS_INTERVAL)
    }

    pub fn completion() -> Self {
        Self::new(COMPLETION_MAX_ATTEMPTS, COMPLETION_INTERVAL)
    }

    /// Upper bound on the whole loop: every probe timing out plus the
    /// sleeps between them
    pub fn ceiling(&self) -> Duration {
        let probing = self.attempt_timeout.checked_mul(self.max_attempts);
        let sleeping = self.interval.checked_mul(self.max_attempts.saturating_sub(1));
        probing
            .zip(sleeping)
            .and_then(|(p, s)| p.checked_add(s))
            .unwrap_or(Duration::MAX)
    }
}

/// Result of a single probe
#[derive(Debug)]
pub enum Probe<T, E> {
    /// Done, stop polling with this value
    Ready(T),
    /// Not yet, try again after the interval
    Pending,
    /// Stop polling immediately with this error
    Abort(E),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PollError<E> {
    #[error("not ready after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error("polling aborted: {0}")]
    Aborted(E),
}

/// Run `probe` until it is ready, aborts, or the budget is spent.
///
/// The probe receives the 1-based attempt number. A probe exceeding the
/// policy's `attempt_timeout` is dropped and counted as pending. The loop
/// never sleeps after the final attempt and never probes more than
/// `max_attempts` times.
pub async fn poll<T, E, F, Fut>(policy: PollPolicy, mut probe: F) -> Result<T, PollError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Probe<T, E>>,
{
    for attempt in 1..=policy.max_attempts {
        match timeout(policy.attempt_timeout, probe(attempt)).await {
            Ok(Probe::Ready(value)) => return Ok(value),
            Ok(Probe::Abort(err)) => return Err(PollError::Aborted(err)),
            Ok(Probe::Pending) => {}
            Err(_) => {
                warn!(
                    attempt,
                    timeout_secs = policy.attempt_timeout.as_secs(),
                    "Attempt timed out, will retry"
                );
            }
        }

        if attempt < policy.max_attempts {
            sleep(policy.interval).await;
        }
    }

    Err(PollError::Exhausted {
        attempts: policy.max_attempts,
    })
}
