//! Locating the story-points field on an unfamiliar tracker.
//!
//! Given every field of one issue whose story points are known, rank the
//! numeric-looking fields by how close they are to that known value. The
//! CLI's `find-field` command prints the ranking so the id can be pinned
//! in configuration.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

/// Default tolerance for "exactly equal to the target".
pub const DEFAULT_TOLERANCE: f64 = 1e-9;

/// A field whose value could be read as a number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericField {
    pub id: String,
    pub name: String,
    pub schema_type: Option<String>,
    pub value: f64,
}

/// Ranked candidates for one issue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryReport {
    pub target: f64,
    /// All numeric fields, closest to the target first.
    pub candidates: Vec<NumericField>,
    /// Candidates within tolerance of the target.
    pub exact: Vec<NumericField>,
}

impl DiscoveryReport {
    /// First exact match, otherwise the closest candidate.
    pub fn best(&self) -> Option<&NumericField> {
        self.exact.first().or_else(|| self.candidates.first())
    }
}

/// Interpret a raw field value as a number when that makes sense.
///
/// Numbers are taken as-is, strings are parsed (`,` accepted as decimal
/// separator), and objects are probed for `value`, `amount` or `number`.
/// Booleans and everything else are not numeric.
pub fn coerce_number(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .replace(',', ".")
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite()),
        Value::Object(obj) => ["value", "amount", "number"]
            .iter()
            .find_map(|k| obj.get(*k))
            .and_then(coerce_number),
        _ => None,
    }
}

/// Rank the numeric fields of an issue against `target`.
///
/// * `fields`       - the issue's `fields` object.
/// * `names`        - field id to display name (from `expand=names`).
/// * `schema_types` - field id to schema type (from the field catalog).
pub fn rank_numeric_fields(
    fields: &Map<String, Value>,
    names: &HashMap<String, String>,
    schema_types: &HashMap<String, String>,
    target: f64,
    tolerance: f64,
) -> DiscoveryReport {
    let mut candidates: Vec<NumericField> = fields
        .iter()
        .filter_map(|(id, raw)| {
            let value = coerce_number(raw)?;
            Some(NumericField {
                id: id.clone(),
                name: names.get(id).cloned().unwrap_or_else(|| id.clone()),
                schema_type: schema_types.get(id).cloned(),
                value,
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        (a.value - target)
            .abs()
            .total_cmp(&(b.value - target).abs())
            .then_with(|| a.id.cmp(&b.id))
    });

    let exact = candidates
        .iter()
        .filter(|c| target.is_finite() && (c.value - target).abs() <= tolerance)
        .cloned()
        .collect();

    DiscoveryReport {
        target,
        candidates,
        exact,
    }
}
