//! Batch save of locally edited items.
//!
//! Items are processed one at a time and independently: a failure on one
//! item is recorded in the report and the batch moves on. For each dirty
//! item the sequence is
//!
//! 1. fresh read of the remote value,
//! 2. reconcile the user's delta against it,
//! 3. acquire the lease,
//! 4. write the reconciled value,
//! 5. release the lease, whether or not the write succeeded.
//!
//! The fresh read happens before the lease is taken, so a write landing
//! between steps 1 and 4 from a client that does not lock is not seen.

use std::sync::Arc;

use pointdown_core::field::{FieldResolver, ResolvedField};
use pointdown_core::item::LocalItem;
use pointdown_core::reconcile::reconcile_with_drift;
use pointdown_core::store::{FieldStore, PropertyStore};

use crate::error::SyncError;
use crate::lock::{LockManager, LockTarget};

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// Result of saving one item.
#[derive(Debug)]
pub enum ItemOutcome {
    Saved {
        written: f64,
        /// Remote change detected since the item's baseline; zero if none.
        drift: f64,
    },
    Failed { error: SyncError },
}

#[derive(Debug)]
pub struct ItemReport {
    pub key: String,
    pub outcome: ItemOutcome,
}

/// Per-item results of a batch save, in input order. Clean items are not
/// listed.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub items: Vec<ItemReport>,
}

impl BatchReport {
    pub fn saved(&self) -> usize {
        self.items
            .iter()
            .filter(|r| matches!(r.outcome, ItemOutcome::Saved { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.saved()
    }

    pub fn is_clean(&self) -> bool {
        self.failed() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &SyncError)> {
        self.items.iter().filter_map(|r| match &r.outcome {
            ItemOutcome::Failed { error } => Some((r.key.as_str(), error)),
            ItemOutcome::Saved { .. } => None,
        })
    }
}

// ---------------------------------------------------------------------------
// SyncOrchestrator
// ---------------------------------------------------------------------------

pub struct SyncOrchestrator<F, P> {
    fields: Arc<F>,
    locks: LockManager<P>,
    resolver: FieldResolver,
}

impl<F, P> SyncOrchestrator<F, P>
where
    F: FieldStore,
    P: PropertyStore,
{
    pub fn new(fields: Arc<F>, locks: LockManager<P>, resolver: FieldResolver) -> Self {
        Self {
            fields,
            locks,
            resolver,
        }
    }

    pub fn locks(&self) -> &LockManager<P> {
        &self.locks
    }

    /// The tracked field, resolving it against the catalog on first use.
    pub async fn field(&self) -> Result<&ResolvedField, SyncError> {
        self.resolver
            .resolve(self.fields.as_ref())
            .await
            .map_err(|e| SyncError::FieldResolution(Box::new(e)))
    }

    /// Load every entity matching `jql` as a clean local item.
    pub async fn refresh(&self, jql: &str) -> Result<Vec<LocalItem>, SyncError> {
        let field_id = self.field().await?.id.clone();
        let entities = self
            .fields
            .search(jql, &field_id)
            .await
            .map_err(|e| SyncError::Search(Box::new(e)))?;

        tracing::info!(count = entities.len(), "Loaded items");
        Ok(entities.into_iter().map(LocalItem::from_entity).collect())
    }

    /// Fresh read of a single entity as a clean local item.
    pub async fn load(&self, key: &str) -> Result<LocalItem, SyncError> {
        let field_id = self.field().await?.id.clone();
        let entity = self
            .fields
            .fetch_entity(key, &field_id)
            .await
            .map_err(|e| SyncError::Fetch {
                entity_key: key.to_string(),
                source: Box::new(e),
            })?;
        Ok(LocalItem::from_entity(entity))
    }

    /// Save every dirty item in `items`, updating saved items in place.
    ///
    /// Only a field resolution failure aborts the batch; every other error
    /// is reported against its item. Saved items get their baseline set to
    /// the written value and their edit cleared; failed items are left
    /// dirty so the edit can be retried.
    pub async fn save_dirty_batch(&self, items: &mut [LocalItem]) -> Result<BatchReport, SyncError> {
        let field_id = self.field().await?.id.clone();
        let mut report = BatchReport::default();

        for item in items.iter_mut().filter(|item| item.is_dirty()) {
            let outcome = match self.save_item(&field_id, item).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    tracing::warn!(entity_key = %item.key, error = %error, "Save failed");
                    ItemOutcome::Failed { error }
                }
            };
            report.items.push(ItemReport {
                key: item.key.clone(),
                outcome,
            });
        }

        tracing::info!(
            saved = report.saved(),
            failed = report.failed(),
            "Batch save finished",
        );
        Ok(report)
    }

    async fn save_item(&self, field_id: &str, item: &mut LocalItem) -> Result<ItemOutcome, SyncError> {
        let fresh = self
            .fields
            .fetch_entity(&item.key, field_id)
            .await
            .map_err(|e| SyncError::Fetch {
                entity_key: item.key.clone(),
                source: Box::new(e),
            })?;

        let plan = reconcile_with_drift(item.baseline, item.current(), fresh.field_value);
        if plan.drifted() {
            tracing::info!(
                entity_key = %item.key,
                baseline = item.baseline,
                remote = fresh.field_value,
                value = plan.value,
                "Remote value changed; replaying local delta",
            );
        }

        let target = LockTarget {
            key: &fresh.key,
            id: fresh.id.or(item.id),
        };
        let lease = self.locks.acquire(target).await?;

        let written = self.fields.write_field(&item.key, field_id, plan.value).await;
        self.locks.release(target, lease.as_ref()).await;

        written.map_err(|e| SyncError::Write {
            entity_key: item.key.clone(),
            value: plan.value,
            source: Box::new(e),
        })?;

        tracing::info!(entity_key = %item.key, written = plan.value, drift = plan.drift, "Saved");
        item.id = target.id;
        item.mark_saved(plan.value);

        Ok(ItemOutcome::Saved {
            written: plan.value,
            drift: plan.drift,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryTracker;
    use assert_matches::assert_matches;
    use pointdown_core::config::LockConfig;
    use pointdown_core::store::FieldDef;

    fn orchestrator(
        store: &Arc<InMemoryTracker>,
        resolver: FieldResolver,
    ) -> SyncOrchestrator<InMemoryTracker, InMemoryTracker> {
        let locks = LockManager::new(Arc::clone(store), LockConfig::new("alice"));
        SyncOrchestrator::new(Arc::clone(store), locks, resolver)
    }

    #[tokio::test(start_paused = true)]
    async fn clean_items_are_skipped() {
        let store = Arc::new(InMemoryTracker::new());
        store.insert_entity("ABC-1", Some(1), "One", 3.0);
        let sync = orchestrator(&store, FieldResolver::fixed("customfield_10022"));

        let mut items = sync.refresh("project = ABC").await.unwrap();
        let report = sync.save_dirty_batch(&mut items).await.unwrap();

        assert!(report.items.is_empty());
        assert!(store.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unresolvable_field_aborts_batch() {
        let store = Arc::new(InMemoryTracker::new());
        store.set_fields(vec![FieldDef {
            id: "customfield_1".into(),
            name: "Sprint".into(),
            schema_type: Some("array".into()),
        }]);
        let sync = orchestrator(&store, FieldResolver::story_points_by_name());

        let err = sync.save_dirty_batch(&mut []).await.unwrap_err();
        assert_matches!(err, SyncError::FieldResolution(_));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_uses_resolved_field() {
        let store = Arc::new(InMemoryTracker::new());
        store.set_fields(vec![FieldDef {
            id: "customfield_10016".into(),
            name: "Story point estimate".into(),
            schema_type: Some("number".into()),
        }]);
        store.insert_entity("ABC-1", Some(1), "One", 2.0);
        let sync = orchestrator(&store, FieldResolver::story_points_by_name());

        let items = sync.refresh("project = ABC").await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].baseline, 2.0);
        assert_eq!(sync.field().await.unwrap().id, "customfield_10016");
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failure_is_reported_per_item() {
        let store = Arc::new(InMemoryTracker::new());
        store.insert_entity("ABC-1", Some(1), "One", 1.0);
        let sync = orchestrator(&store, FieldResolver::fixed("f"));

        let mut items = sync.refresh("x").await.unwrap();
        items[0].set_edited(2.0);
        items[0].key = "ABC-404".into();

        let report = sync.save_dirty_batch(&mut items).await.unwrap();
        assert_eq!(report.failed(), 1);
        assert_matches!(
            &report.items[0].outcome,
            ItemOutcome::Failed { error: SyncError::Fetch { entity_key, .. } } if entity_key == "ABC-404"
        );
        assert!(items[0].is_dirty());
    }
}
