//! Cooperative, lease-based lock over a conditional property store.
//!
//! A lease is a small JSON value stored under a well-known property key on
//! the entity being written. Acquisition is a conditional create followed
//! by a read-back: the store may acknowledge a write that lost a race, so
//! ownership is only trusted once the stored nonce matches ours. A lease
//! whose expiry has passed is taken over with a replace keyed on the exact
//! value we observed, so two clients racing for the same stale lease
//! cannot both win.
//!
//! The lock is advisory. Clients that do not run this protocol are not
//! excluded, and a holder that outlives its TTL is not fenced off.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;

use pointdown_core::config::LockConfig;
use pointdown_core::item::Entity;
use pointdown_core::lease::Lease;
use pointdown_core::retry::{retry_until, Attempt, RetryError};
use pointdown_core::store::{Expected, PropertyStore, SetOutcome, TaskOutcome};
use pointdown_core::types::EntityId;

use crate::error::LockError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The entity a lock is taken on.
#[derive(Debug, Clone, Copy)]
pub struct LockTarget<'a> {
    pub key: &'a str,
    pub id: Option<EntityId>,
}

impl<'a> From<&'a Entity> for LockTarget<'a> {
    fn from(entity: &'a Entity) -> Self {
        Self {
            key: &entity.key,
            id: entity.id,
        }
    }
}

/// What a [`LockManager::release`] call ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Locking is disabled or no lease was held.
    Skipped,
    /// The conditional delete was accepted.
    Released,
    /// The delete failed or was not confirmed. The lease will expire on its own.
    Abandoned,
}

/// Why a single acquisition attempt did not end with a held lease.
#[derive(Debug, Clone, PartialEq)]
enum Contention {
    /// A live lease held by someone else.
    Held { owner: String },
    /// Our write (create or takeover) did not stick.
    LostRace,
}

/// A failed store call, tagged with the protocol step that made it.
struct StepError<E> {
    operation: &'static str,
    source: E,
}

fn step<E>(operation: &'static str) -> impl FnOnce(E) -> StepError<E> {
    move |source| StepError { operation, source }
}

// ---------------------------------------------------------------------------
// LockManager
// ---------------------------------------------------------------------------

/// Acquires and releases leases on entities through a [`PropertyStore`].
pub struct LockManager<P> {
    store: Arc<P>,
    config: LockConfig,
}

impl<P: PropertyStore> LockManager<P> {
    pub fn new(store: Arc<P>, config: LockConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// [`acquire_with`](Self::acquire_with) using the configured TTL and
    /// wait budget.
    pub async fn acquire(&self, target: LockTarget<'_>) -> Result<Option<Lease>, LockError> {
        self.acquire_with(target, self.config.ttl, self.config.wait_budget)
            .await
    }

    /// Take a lease on `target`, waiting up to `budget` for a live foreign
    /// lease to go away.
    ///
    /// Returns `Ok(None)` when locking is disabled. Each attempt tries a
    /// conditional create, then inspects whatever lease is present and
    /// takes it over if it has expired. Between attempts the caller sleeps
    /// for the poll interval plus jitter, never past the budget.
    pub async fn acquire_with(
        &self,
        target: LockTarget<'_>,
        ttl: Duration,
        budget: Duration,
    ) -> Result<Option<Lease>, LockError> {
        if !self.config.enabled {
            return Ok(None);
        }

        let entity_id = target.id.ok_or_else(|| LockError::MissingEntityId {
            entity_key: target.key.to_string(),
        })?;

        let policy = self.config.wait_policy(budget);
        let result = retry_until(&policy, |attempt| async move {
            self.attempt(entity_id, ttl, attempt).await
        })
        .await;

        match result {
            Ok(lease) => {
                tracing::info!(
                    entity_key = %target.key,
                    entity_id,
                    nonce = %lease.nonce,
                    "Lock acquired",
                );
                Ok(Some(lease))
            }
            Err(RetryError::Exhausted { attempts, elapsed, last }) => {
                let holder = match &last {
                    Some(Contention::Held { owner }) => owner.as_str(),
                    _ => "-",
                };
                tracing::warn!(
                    entity_key = %target.key,
                    attempts,
                    waited_ms = elapsed.as_millis() as u64,
                    holder,
                    "Gave up waiting for lock",
                );
                Err(LockError::Timeout {
                    entity_key: target.key.to_string(),
                    waited: elapsed,
                })
            }
            Err(RetryError::Aborted(StepError { operation, source })) => Err(LockError::Store {
                entity_key: target.key.to_string(),
                operation,
                source: Box::new(source),
            }),
        }
    }

    /// One pass through create, inspect and takeover.
    async fn attempt(
        &self,
        entity_id: EntityId,
        ttl: Duration,
        attempt: u32,
    ) -> Result<Attempt<Lease, Contention>, StepError<P::Error>> {
        let candidate = Lease::new(self.config.owner.clone(), ttl, Utc::now());

        if self.place(entity_id, &Expected::Absent, &candidate).await? {
            return Ok(Attempt::Done(candidate));
        }

        let key = self.config.property_key.as_str();
        let Some(observed) = self.store.get(entity_id, key).await.map_err(step("inspect"))? else {
            // Released between our create and this read.
            return Ok(Attempt::Retry(Contention::LostRace));
        };

        let existing = Lease::from_value(&observed);
        if existing.is_held_by(&candidate.owner, &candidate.nonce) {
            // Our write landed even though its task was not reported as done.
            return Ok(Attempt::Done(candidate));
        }
        if !existing.is_expired(Utc::now()) {
            tracing::debug!(
                entity_id,
                attempt,
                holder = %existing.owner,
                "Lock held by another client",
            );
            return Ok(Attempt::Retry(Contention::Held {
                owner: existing.owner,
            }));
        }

        tracing::info!(
            entity_id,
            stale_owner = %existing.owner,
            "Taking over expired lock",
        );
        if self.place(entity_id, &Expected::Equals(observed), &candidate).await? {
            return Ok(Attempt::Done(candidate));
        }

        Ok(Attempt::Retry(Contention::LostRace))
    }

    /// Conditionally write `candidate`, then confirm it by reading it back.
    async fn place(
        &self,
        entity_id: EntityId,
        expected: &Expected,
        candidate: &Lease,
    ) -> Result<bool, StepError<P::Error>> {
        let key = self.config.property_key.as_str();
        let operation = match expected {
            Expected::Absent => "create",
            Expected::Equals(_) => "takeover",
        };

        let outcome = self
            .store
            .conditional_set(entity_id, key, expected, &candidate.to_value())
            .await
            .map_err(step(operation))?;

        let accepted = match outcome {
            SetOutcome::Applied => true,
            SetOutcome::Rejected => false,
            SetOutcome::Pending(handle) => {
                match self.store.await_task(&handle).await.map_err(step(operation))? {
                    TaskOutcome::Succeeded => true,
                    other => {
                        tracing::debug!(entity_id, task = %handle.id, outcome = ?other, "Lock write task did not succeed");
                        false
                    }
                }
            }
        };
        if !accepted {
            return Ok(false);
        }

        let stored = self.store.get(entity_id, key).await.map_err(step("confirm"))?;
        Ok(stored
            .map(|value| Lease::from_value(&value).is_held_by(&candidate.owner, &candidate.nonce))
            .unwrap_or(false))
    }

    /// Best-effort release of `lease`.
    ///
    /// The delete is conditional on the stored value still being exactly
    /// our lease, so a lease that was taken over after ours expired is
    /// left alone. Failures are logged and swallowed.
    pub async fn release(&self, target: LockTarget<'_>, lease: Option<&Lease>) -> ReleaseOutcome {
        let (true, Some(lease), Some(entity_id)) = (self.config.enabled, lease, target.id) else {
            return ReleaseOutcome::Skipped;
        };

        match self.delete(entity_id, &lease.to_value()).await {
            Ok(true) => {
                tracing::info!(entity_key = %target.key, "Lock released");
                ReleaseOutcome::Released
            }
            Ok(false) => {
                tracing::warn!(entity_key = %target.key, "Lock release was not applied; lease will expire");
                ReleaseOutcome::Abandoned
            }
            Err(e) => {
                tracing::warn!(entity_key = %target.key, error = %e, "Lock release failed; lease will expire");
                ReleaseOutcome::Abandoned
            }
        }
    }

    async fn delete(&self, entity_id: EntityId, expected: &Value) -> Result<bool, P::Error> {
        let key = self.config.property_key.as_str();
        match self.store.conditional_delete(entity_id, key, expected).await? {
            SetOutcome::Applied => Ok(true),
            SetOutcome::Rejected => Ok(false),
            SetOutcome::Pending(handle) => {
                Ok(self.store.await_task(&handle).await? == TaskOutcome::Succeeded)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
