//! In-memory tracker for tests and dry runs.
//!
//! Implements both [`PropertyStore`] and [`FieldStore`] with the same
//! acknowledgement semantics as the Jira bulk property endpoints: a
//! conditional write whose precondition does not hold is still reported
//! as accepted and simply has no effect. Hooks let tests plant foreign
//! leases, move remote values behind the client's back, and inject
//! failures.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use pointdown_core::item::Entity;
use pointdown_core::store::{
    Expected, FieldDef, FieldStore, PropertyStore, SetOutcome, TaskHandle, TaskOutcome,
};
use pointdown_core::types::EntityId;

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("Entity {0} does not exist")]
    NotFound(String),

    #[error("Injected failure: {0}")]
    Injected(String),
}

#[derive(Debug, Default)]
struct MemoryState {
    entities: BTreeMap<String, Entity>,
    fields: Vec<FieldDef>,
    properties: HashMap<(EntityId, String), Value>,
    tasks: HashMap<String, TaskOutcome>,
    next_task: u64,
    property_calls: usize,
    fail_properties: bool,
    failing_writes: HashSet<String>,
    hijack_next_set: Option<Value>,
    /// Outcome reported for async tasks; success when unset.
    task_report: Option<TaskOutcome>,
    writes: Vec<(String, f64)>,
}

/// Thread-safe fake of the tracker.
#[derive(Debug, Default)]
pub struct InMemoryTracker {
    state: Mutex<MemoryState>,
    /// Answer property writes with a task handle instead of `Applied`.
    async_tasks: bool,
    /// Answer failed preconditions with `Rejected` instead of a silent no-op.
    reject_conflicts: bool,
}

impl InMemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_async_tasks(mut self) -> Self {
        self.async_tasks = true;
        self
    }

    pub fn with_rejections(mut self) -> Self {
        self.reject_conflicts = true;
        self
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ---- entities ----

    /// Add or replace an entity.
    pub fn insert_entity(&self, key: &str, id: Option<EntityId>, summary: &str, value: f64) {
        self.state().entities.insert(
            key.to_string(),
            Entity {
                key: key.to_string(),
                id,
                summary: summary.to_string(),
                field_value: value,
            },
        );
    }

    /// Change a remote value as another client would.
    pub fn set_remote_value(&self, key: &str, value: f64) {
        if let Some(entity) = self.state().entities.get_mut(key) {
            entity.field_value = value;
        }
    }

    pub fn remote_value(&self, key: &str) -> Option<f64> {
        self.state().entities.get(key).map(|e| e.field_value)
    }

    pub fn set_fields(&self, fields: Vec<FieldDef>) {
        self.state().fields = fields;
    }

    /// Make every `write_field` on `key` fail.
    pub fn fail_writes_for(&self, key: &str) {
        self.state().failing_writes.insert(key.to_string());
    }

    /// Successful field writes, in order.
    pub fn writes(&self) -> Vec<(String, f64)> {
        self.state().writes.clone()
    }

    // ---- properties ----

    pub fn property(&self, entity_id: EntityId, key: &str) -> Option<Value> {
        self.state()
            .properties
            .get(&(entity_id, key.to_string()))
            .cloned()
    }

    /// Plant a property directly, e.g. a foreign lease.
    pub fn set_property(&self, entity_id: EntityId, key: &str, value: Value) {
        self.state()
            .properties
            .insert((entity_id, key.to_string()), value);
    }

    /// The next conditional set stores `value` instead of the caller's
    /// value and still reports success, as if a rival write landed last.
    pub fn hijack_next_set(&self, value: Value) {
        self.state().hijack_next_set = Some(value);
    }

    /// Report every subsequent async task as `outcome`, regardless of
    /// whether the write itself took effect.
    pub fn report_tasks_as(&self, outcome: TaskOutcome) {
        self.state().task_report = Some(outcome);
    }

    /// Make every property call fail until switched off.
    pub fn fail_property_calls(&self, fail: bool) {
        self.state().fail_properties = fail;
    }

    /// Number of property store calls made so far.
    pub fn property_calls(&self) -> usize {
        self.state().property_calls
    }

    fn acknowledge(&self, state: &mut MemoryState, applied: bool) -> SetOutcome {
        if !applied && self.reject_conflicts {
            return SetOutcome::Rejected;
        }
        if !self.async_tasks {
            return SetOutcome::Applied;
        }
        state.next_task += 1;
        let id = format!("task-{}", state.next_task);
        let outcome = state.task_report.clone().unwrap_or(TaskOutcome::Succeeded);
        state.tasks.insert(id.clone(), outcome);
        SetOutcome::Pending(TaskHandle { id })
    }

    fn begin_property_call(state: &mut MemoryState, operation: &str) -> Result<(), MemoryError> {
        state.property_calls += 1;
        if state.fail_properties {
            return Err(MemoryError::Injected(operation.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PropertyStore for InMemoryTracker {
    type Error = MemoryError;

    async fn conditional_set(
        &self,
        entity_id: EntityId,
        key: &str,
        expected: &Expected,
        value: &Value,
    ) -> Result<SetOutcome, MemoryError> {
        let mut state = self.state();
        Self::begin_property_call(&mut state, "conditional_set")?;

        let slot = (entity_id, key.to_string());
        if let Some(rival) = state.hijack_next_set.take() {
            state.properties.insert(slot, rival);
            return Ok(self.acknowledge(&mut state, true));
        }

        let holds = match expected {
            Expected::Absent => !state.properties.contains_key(&slot),
            Expected::Equals(current) => state.properties.get(&slot) == Some(current),
        };
        if holds {
            state.properties.insert(slot, value.clone());
        }
        Ok(self.acknowledge(&mut state, holds))
    }

    async fn conditional_delete(
        &self,
        entity_id: EntityId,
        key: &str,
        expected: &Value,
    ) -> Result<SetOutcome, MemoryError> {
        let mut state = self.state();
        Self::begin_property_call(&mut state, "conditional_delete")?;

        let slot = (entity_id, key.to_string());
        let holds = state.properties.get(&slot) == Some(expected);
        if holds {
            state.properties.remove(&slot);
        }
        Ok(self.acknowledge(&mut state, holds))
    }

    async fn get(&self, entity_id: EntityId, key: &str) -> Result<Option<Value>, MemoryError> {
        let mut state = self.state();
        Self::begin_property_call(&mut state, "get")?;
        Ok(state.properties.get(&(entity_id, key.to_string())).cloned())
    }

    async fn await_task(&self, handle: &TaskHandle) -> Result<TaskOutcome, MemoryError> {
        let mut state = self.state();
        Self::begin_property_call(&mut state, "await_task")?;
        Ok(state
            .tasks
            .remove(&handle.id)
            .unwrap_or(TaskOutcome::Failed(format!("unknown task {}", handle.id))))
    }
}

#[async_trait]
impl FieldStore for InMemoryTracker {
    type Error = MemoryError;

    async fn fetch_entity(&self, key: &str, _field_id: &str) -> Result<Entity, MemoryError> {
        self.state()
            .entities
            .get(key)
            .cloned()
            .ok_or_else(|| MemoryError::NotFound(key.to_string()))
    }

    async fn write_field(&self, key: &str, _field_id: &str, value: f64) -> Result<(), MemoryError> {
        let mut state = self.state();
        if state.failing_writes.contains(key) {
            return Err(MemoryError::Injected(format!("write {key}")));
        }
        let entity = state
            .entities
            .get_mut(key)
            .ok_or_else(|| MemoryError::NotFound(key.to_string()))?;
        entity.field_value = value;
        state.writes.push((key.to_string(), value));
        Ok(())
    }

    /// Ignores the query and returns every entity in key order.
    async fn search(&self, _jql: &str, _field_id: &str) -> Result<Vec<Entity>, MemoryError> {
        Ok(self.state().entities.values().cloned().collect())
    }

    async fn list_fields(&self) -> Result<Vec<FieldDef>, MemoryError> {
        Ok(self.state().fields.clone())
    }
}
