//! Lock protocol and task polling constants.
//!
//! Values are fixed by the protocol; only the enabled flag, the owner
//! identity and the property key are expected to vary per deployment.

use std::time::Duration;

use crate::retry::RetryPolicy;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Entity property key under which leases are stored.
pub const DEFAULT_LOCK_PROPERTY_KEY: &str = "pointdown.lock";

/// Lifetime of a freshly acquired lease.
pub const LOCK_TTL_SECS: u64 = 60;

/// Total wall-clock time `acquire` may spend contending for a lease.
pub const LOCK_WAIT_BUDGET_SECS: u64 = 30;

/// Base wait between lock attempts.
pub const LOCK_POLL_INTERVAL_MS: u64 = 900;

/// Maximum random extra wait added to [`LOCK_POLL_INTERVAL_MS`].
pub const LOCK_POLL_JITTER_MS: u64 = 400;

/// Interval between async task status checks.
pub const TASK_POLL_INTERVAL_MS: u64 = 800;

/// Task status checks before reporting a timeout.
pub const TASK_POLL_MAX_ATTEMPTS: u32 = 20;

// ---------------------------------------------------------------------------
// LockConfig
// ---------------------------------------------------------------------------

/// Lock manager configuration.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// When `false`, `acquire` and `release` are no-ops and writes are
    /// unguarded (last writer wins).
    pub enabled: bool,
    /// Identity recorded in every lease this client writes.
    pub owner: String,
    pub property_key: String,
    pub ttl: Duration,
    pub wait_budget: Duration,
    pub poll_interval: Duration,
    pub poll_jitter: Duration,
}

impl LockConfig {
    /// Enabled configuration with the protocol defaults.
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            enabled: true,
            owner: owner.into(),
            property_key: DEFAULT_LOCK_PROPERTY_KEY.to_string(),
            ttl: Duration::from_secs(LOCK_TTL_SECS),
            wait_budget: Duration::from_secs(LOCK_WAIT_BUDGET_SECS),
            poll_interval: Duration::from_millis(LOCK_POLL_INTERVAL_MS),
            poll_jitter: Duration::from_millis(LOCK_POLL_JITTER_MS),
        }
    }

    /// Configuration with locking turned off.
    pub fn disabled(owner: impl Into<String>) -> Self {
        Self {
            enabled: false,
            ..Self::new(owner)
        }
    }

    /// Policy driving the contention loop for a given wait budget.
    pub fn wait_policy(&self, budget: Duration) -> RetryPolicy {
        RetryPolicy::fixed(self.poll_interval)
            .with_jitter(self.poll_jitter)
            .with_max_elapsed(budget)
    }
}

// ---------------------------------------------------------------------------
// TaskPollConfig
// ---------------------------------------------------------------------------

/// How async bulk-operation tasks are polled.
#[derive(Debug, Clone)]
pub struct TaskPollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for TaskPollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(TASK_POLL_INTERVAL_MS),
            max_attempts: TASK_POLL_MAX_ATTEMPTS,
        }
    }
}

impl TaskPollConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.interval).with_max_attempts(self.max_attempts)
    }
}
