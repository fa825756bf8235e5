//! Traits for the remote side of the protocol.
//!
//! [`PropertyStore`] is the conditional key/value substrate leases live in;
//! [`FieldStore`] reads and writes the tracked numeric field. The tracker
//! crate implements both against the Jira REST API; the sync crate ships an
//! in-memory implementation for tests.

use async_trait::async_trait;
use serde_json::Value;

use crate::item::Entity;
use crate::types::EntityId;

// ---------------------------------------------------------------------------
// Conditional write types
// ---------------------------------------------------------------------------

/// Precondition for a conditional property write.
#[derive(Debug, Clone, PartialEq)]
pub enum Expected {
    /// The property must not exist.
    Absent,
    /// The property must currently hold exactly this value.
    Equals(Value),
}

/// Handle to an asynchronous bulk operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    pub id: String,
}

/// Acknowledgement of a conditional write or delete.
///
/// `Applied` only means the store accepted the request. Under races the
/// stored value can differ from what was sent, so the lock manager always
/// reads back before trusting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetOutcome {
    Applied,
    Pending(TaskHandle),
    /// The precondition did not hold. Not an error.
    Rejected,
}

/// Terminal result of polling a [`TaskHandle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed(String),
    TimedOut,
}

/// Status of an async task as reported by the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Succeeded,
    Failed,
}

impl TaskState {
    /// Classify a free-form status string by case-insensitive keyword match.
    ///
    /// `COMPLETE`, `SUCCESS`... are success; `FAILED`, `ERROR`, `CANCELLED`...
    /// are failure; anything else (`ENQUEUED`, `RUNNING`, ...) is still running.
    pub fn classify(status: &str) -> Self {
        let status = status.to_ascii_lowercase();
        if status.contains("complete") || status.contains("success") {
            Self::Succeeded
        } else if status.contains("fail") || status.contains("error") || status.contains("cancel") {
            Self::Failed
        } else {
            Self::Running
        }
    }
}

// ---------------------------------------------------------------------------
// Field catalog types
// ---------------------------------------------------------------------------

/// A field definition from the tracker's field catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub id: String,
    pub name: String,
    pub schema_type: Option<String>,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Conditional key/value properties attached to entities.
#[async_trait]
pub trait PropertyStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Write `value` under `key` on `entity_id` if `expected` holds.
    async fn conditional_set(
        &self,
        entity_id: EntityId,
        key: &str,
        expected: &Expected,
        value: &Value,
    ) -> Result<SetOutcome, Self::Error>;

    /// Delete `key` on `entity_id` if it currently equals `expected`.
    async fn conditional_delete(
        &self,
        entity_id: EntityId,
        key: &str,
        expected: &Value,
    ) -> Result<SetOutcome, Self::Error>;

    /// Point read. A missing property is `Ok(None)`.
    async fn get(&self, entity_id: EntityId, key: &str) -> Result<Option<Value>, Self::Error>;

    /// Poll a pending operation until it reaches a terminal state or the
    /// polling budget runs out.
    async fn await_task(&self, handle: &TaskHandle) -> Result<TaskOutcome, Self::Error>;
}

/// Read/write access to the tracked numeric field.
#[async_trait]
pub trait FieldStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fresh read of one entity including its current field value.
    async fn fetch_entity(&self, key: &str, field_id: &str) -> Result<Entity, Self::Error>;

    /// Overwrite the field on `key` with `value`.
    async fn write_field(&self, key: &str, field_id: &str, value: f64) -> Result<(), Self::Error>;

    /// All entities matching `jql`, with `field_id` populated.
    async fn search(&self, jql: &str, field_id: &str) -> Result<Vec<Entity>, Self::Error>;

    /// The tracker's field catalog.
    async fn list_fields(&self) -> Result<Vec<FieldDef>, Self::Error>;
}
