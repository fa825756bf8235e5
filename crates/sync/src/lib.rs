//! Lease-guarded synchronization of edited items back to the tracker.
//!
//! [`LockManager`](lock::LockManager) implements the cooperative lock
//! protocol on top of any [`PropertyStore`](pointdown_core::store::PropertyStore);
//! [`SyncOrchestrator`](orchestrator::SyncOrchestrator) drives the per-item
//! save sequence (fresh read, reconcile, acquire, write, release) across a
//! batch of dirty items.

pub mod error;
pub mod lock;
pub mod memory;
pub mod orchestrator;
