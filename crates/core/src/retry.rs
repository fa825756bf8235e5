//! Generic "retry until" primitive shared by every polling loop.
//!
//! A [`RetryPolicy`] describes how long to wait between attempts (base
//! interval, optional exponential growth, random jitter) and when to give
//! up (attempt cap, wall-clock budget, or both). [`retry_until`] drives an
//! async operation under a policy until the operation reports
//! [`Attempt::Done`], fails hard, or the policy is exhausted.
//!
//! The same primitive runs the lock wait loop, async task polling and the
//! transport-level transient-error retry, each with its own policy.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Tunable parameters for a retry loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the second attempt.
    pub interval: Duration,
    /// Upper bound of the uniformly random extra delay added to each wait.
    pub jitter: Duration,
    /// Factor by which the base delay grows after each attempt (`1.0` = fixed).
    pub multiplier: f64,
    /// Upper bound on the base delay between attempts.
    pub max_interval: Duration,
    /// Give up after this many attempts.
    pub max_attempts: Option<u32>,
    /// Give up once this much wall-clock time has passed since the first attempt.
    pub max_elapsed: Option<Duration>,
}

impl RetryPolicy {
    /// Fixed-interval policy with no jitter and no limits.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            jitter: Duration::ZERO,
            multiplier: 1.0,
            max_interval: interval,
            max_attempts: None,
            max_elapsed: None,
        }
    }

    /// Exponential-backoff policy starting at `initial` and clamped at `max`.
    pub fn exponential(initial: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            interval: initial,
            jitter: Duration::ZERO,
            multiplier,
            max_interval: max,
            max_attempts: None,
            max_elapsed: None,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_max_elapsed(mut self, budget: Duration) -> Self {
        self.max_elapsed = Some(budget);
        self
    }

    /// Base delay (without jitter) to wait after the given 1-based attempt.
    ///
    /// The result is clamped to [`RetryPolicy::max_interval`].
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let ms = self.interval.as_millis() as f64 * self.multiplier.powi(exponent);
        let max_ms = self.max_interval.as_millis() as f64;
        Duration::from_millis(ms.min(max_ms).max(0.0) as u64)
    }

    /// Base delay plus a random jitter in `0..=jitter`.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        self.base_delay(attempt) + Duration::from_millis(extra)
    }
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

/// Result of a single attempt inside [`retry_until`].
#[derive(Debug)]
pub enum Attempt<T, R = ()> {
    /// Terminal condition reached; stop with this value.
    Done(T),
    /// Not there yet; wait and try again. The reason is kept so it can be
    /// reported if the policy runs out.
    Retry(R),
}

/// Why [`retry_until`] stopped without a value.
#[derive(Debug)]
pub enum RetryError<E, R = ()> {
    /// The attempt cap or the wall-clock budget was exhausted.
    Exhausted {
        attempts: u32,
        elapsed: Duration,
        /// Reason given by the final attempt.
        last: Option<R>,
    },
    /// An attempt failed with an error that must not be retried.
    Aborted(E),
}

/// Run `op` until it returns [`Attempt::Done`], returns `Err`, or `policy`
/// is exhausted.
///
/// `op` receives the 1-based attempt number. Elapsed time is measured with
/// [`tokio::time::Instant`], so loops honour a paused test clock. When a
/// wall-clock budget is set, the final wait is shortened so that the last
/// attempt happens at the deadline rather than after it.
pub async fn retry_until<T, E, R, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, RetryError<E, R>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Attempt<T, R>, E>>,
{
    let started = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let reason = match op(attempt).await {
            Ok(Attempt::Done(value)) => return Ok(value),
            Ok(Attempt::Retry(reason)) => reason,
            Err(e) => return Err(RetryError::Aborted(e)),
        };

        let elapsed = started.elapsed();
        let attempts_left = policy.max_attempts.map_or(true, |max| attempt < max);
        let budget_left = policy.max_elapsed.map_or(true, |budget| elapsed < budget);

        if !attempts_left || !budget_left {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                elapsed,
                last: Some(reason),
            });
        }

        let mut delay = policy.jittered_delay(attempt);
        if let Some(budget) = policy.max_elapsed {
            delay = delay.min(budget.saturating_sub(elapsed));
        }

        tracing::trace!(attempt, delay_ms = delay.as_millis() as u64, "Retrying");
        tokio::time::sleep(delay).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
