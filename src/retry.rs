// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Bounded-backoff retry of operations that report whether they are done.
//!
//! An operation returns `Ok(true)` when finished, `Ok(false)` to be retried
//! after the next delay, and `Err(_)` to stop immediately. Whether an API
//! error is retryable is decided by the operation itself; the executor only
//! schedules attempts and honours cancellation.

use crate::error::RetryAbort;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each attempt
    pub factor: f64,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Maximum number of attempts (None = unbounded)
    pub max_attempts: Option<u32>,
}

impl BackoffPolicy {
    /// The policy shared by every retrying operation: 1s, x1.5, capped at 60s, unbounded.
    pub const fn canonical() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            factor: 1.5,
            max_delay: Duration::from_secs(60),
            max_attempts: None,
        }
    }

    /// Delay that follows `current`, clamped at `max_delay`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let factor = self.factor.max(1.0);
        let next = current.as_secs_f64() * factor;
        Duration::from_secs_f64(next.min(self.max_delay.as_secs_f64()))
    }

    /// The sequence of delays between attempts.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        let first = self.initial_delay.min(self.max_delay);
        std::iter::successors(Some(first), move |d| Some(self.next_delay(*d)))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::canonical()
    }
}

/// Run `operation` until it reports done, fails, or `cancel` fires.
///
/// The first attempt starts immediately. Cancellation is observed before every
/// attempt and while waiting between attempts.
pub async fn run<F, Fut, E>(
    cancel: &CancellationToken,
    policy: &BackoffPolicy,
    mut operation: F,
) -> Result<(), E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: From<RetryAbort>,
{
    let mut delays = policy.delays();
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryAbort::Cancelled.into());
        }

        attempt += 1;
        if operation().await? {
            return Ok(());
        }

        if policy.max_attempts.is_some_and(|max| attempt >= max) {
            return Err(RetryAbort::Exhausted(attempt).into());
        }

        let delay = delays.next().unwrap_or(policy.max_delay);
        trace!(attempt, delay_ms = delay.as_millis() as u64, "Operation not done, backing off");

        tokio::select! {
            _ = cancel.cancelled() => return Err(RetryAbort::Cancelled.into()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
