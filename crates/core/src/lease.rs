//! Lease model: the value stored in the lock property.
//!
//! A lease is serialized as
//! `{"owner": "...", "nonce": "...", "expiresAt": <epoch millis>}`.
//! Parsing is lenient because the property may have been written by an
//! older client or edited by hand: a missing or unreadable expiry yields a
//! lease that is always expired, so a garbage record can be taken over
//! instead of blocking the entity forever.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{json, Value};

use crate::types::Timestamp;

/// A time-bounded exclusivity claim on one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub owner: String,
    /// Unique per acquisition attempt.
    pub nonce: String,
    /// `None` when the stored expiry could not be parsed.
    pub expires_at: Option<Timestamp>,
}

impl Lease {
    /// Build a candidate lease for `owner` valid for `ttl` from `now`.
    ///
    /// The expiry is truncated to millisecond precision so that the value
    /// written to the store and the in-memory lease stay identical.
    pub fn new(owner: impl Into<String>, ttl: Duration, now: Timestamp) -> Self {
        let expires_at = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .and_then(|t| DateTime::<Utc>::from_timestamp_millis(t.timestamp_millis()));

        Self {
            owner: owner.into(),
            nonce: uuid::Uuid::new_v4().to_string(),
            expires_at,
        }
    }

    /// `true` once `now` is past the expiry, and always when the expiry is unknown.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        match self.expires_at {
            Some(expires_at) => now > expires_at,
            None => true,
        }
    }

    /// Whether this stored lease was written by `owner` in the acquisition
    /// identified by `nonce`.
    pub fn is_held_by(&self, owner: &str, nonce: &str) -> bool {
        !nonce.is_empty() && self.nonce == nonce && self.owner == owner
    }

    /// Whether `other` records the same acquisition as this lease.
    pub fn same_acquisition(&self, other: &Lease) -> bool {
        !self.nonce.is_empty() && self.nonce == other.nonce
    }

    /// JSON representation stored in the lock property.
    pub fn to_value(&self) -> Value {
        json!({
            "owner": self.owner,
            "nonce": self.nonce,
            "expiresAt": self.expires_at.map(|t| t.timestamp_millis()),
        })
    }

    /// Parse a stored lock property. Never fails; unknown shapes produce an
    /// ownerless, already-expired lease.
    pub fn from_value(value: &Value) -> Self {
        let text = |field: &str| {
            value
                .get(field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Self {
            owner: text("owner"),
            nonce: text("nonce"),
            expires_at: value.get("expiresAt").and_then(parse_expiry),
        }
    }
}

/// Accepts epoch millis (number or numeric string) or an RFC 3339 string.
fn parse_expiry(raw: &Value) -> Option<Timestamp> {
    match raw {
        Value::Number(n) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            DateTime::<Utc>::from_timestamp_millis(millis)
        }
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(millis) => DateTime::<Utc>::from_timestamp_millis(millis),
                Err(_) => DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|t| t.with_timezone(&Utc)),
            }
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
