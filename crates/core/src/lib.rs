//! Domain logic for pointdown.
//!
//! Pure types and algorithms shared by the tracker client, the sync
//! engine and the CLI: the lease model, baseline reconciliation, the
//! generic retry primitive, local item editing, and the store traits
//! the lock protocol is written against.

pub mod config;
pub mod discovery;
pub mod error;
pub mod field;
pub mod item;
pub mod jql;
pub mod lease;
pub mod reconcile;
pub mod retry;
pub mod store;
pub mod types;
