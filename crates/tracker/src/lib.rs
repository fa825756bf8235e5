//! Jira REST client for pointdown.
//!
//! [`TrackerApi`] wraps the Jira Cloud v3 HTTP API with [`reqwest`] and
//! implements the core store traits: entity-property conditional writes
//! and async task polling for the lock protocol, and issue field
//! read/write, paginated search and the field catalog for the sync
//! engine. Every call goes through a transport-level retry for transient
//! failures, independent of the lock's own contention loop.

pub mod api;
pub mod config;
pub mod error;
pub mod issues;
pub mod properties;
pub mod schema;

pub use api::TrackerApi;
pub use config::TrackerConfig;
pub use error::TrackerError;
