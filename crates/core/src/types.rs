/// Numeric issue identifiers as returned by the tracker.
pub type EntityId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
