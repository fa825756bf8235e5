use std::time::Duration;

/// Boxed store error, keeping the sync types independent of the backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors from lock acquisition.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The entity has no numeric id to address the lock property with.
    #[error("{entity_key} has no numeric id; cannot lock it")]
    MissingEntityId { entity_key: String },

    /// Another holder kept the lease for the whole wait budget.
    #[error("Timed out after {waited:?} waiting for the lock on {entity_key}")]
    Timeout { entity_key: String, waited: Duration },

    /// A property store call failed (after transport retries).
    #[error("Lock {operation} on {entity_key} failed: {source}")]
    Store {
        entity_key: String,
        operation: &'static str,
        source: BoxError,
    },
}

/// Per-item or batch-level sync failures.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Could not resolve the tracked field: {0}")]
    FieldResolution(#[source] BoxError),

    #[error("Search failed: {0}")]
    Search(#[source] BoxError),

    #[error("Failed to read {entity_key}: {source}")]
    Fetch { entity_key: String, source: BoxError },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("Failed to write {value} to {entity_key}: {source}")]
    Write {
        entity_key: String,
        value: f64,
        source: BoxError,
    },
}

impl SyncError {
    /// Whether the item failed because the lock could not be obtained in time.
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, Self::Lock(LockError::Timeout { .. }))
    }
}
