//! Remote entities and their local editable projection.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::reconcile::round_half;
use crate::types::EntityId;

/// Amount a single step-up / step-down edit changes a value by.
pub const EDIT_STEP: f64 = 0.5;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A remote work item as last read from the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Human-readable key, e.g. `ABC-123`.
    pub key: String,
    /// Numeric id used to address the lock property. `None` when the
    /// tracker returned something that is not a number.
    pub id: Option<EntityId>,
    pub summary: String,
    /// Current value of the tracked field; absent on the remote side reads as 0.
    pub field_value: f64,
}

// ---------------------------------------------------------------------------
// LocalItem
// ---------------------------------------------------------------------------

/// Client-side mutable projection of an [`Entity`].
///
/// `edited` is only kept when it differs from `baseline`, so
/// [`is_dirty`](Self::is_dirty) is exactly "there is an edit".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalItem {
    pub key: String,
    pub id: Option<EntityId>,
    pub summary: String,
    /// Value captured at the last successful sync.
    pub baseline: f64,
    edited: Option<f64>,
}

impl LocalItem {
    /// Fresh, clean item from a list refresh.
    pub fn from_entity(entity: Entity) -> Self {
        Self {
            key: entity.key,
            id: entity.id,
            summary: entity.summary,
            baseline: entity.field_value,
            edited: None,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.edited.is_some_and(|edited| edited != self.baseline)
    }

    /// The user's intended value, if any.
    pub fn edited(&self) -> Option<f64> {
        self.edited
    }

    /// Value to display: the edit when present, otherwise the baseline.
    pub fn current(&self) -> f64 {
        self.edited.unwrap_or(self.baseline)
    }

    /// Set the edited value, snapped to a non-negative half unit. Returns
    /// the stored value.
    pub fn set_edited(&mut self, value: f64) -> f64 {
        let value = clamp_half(value);
        self.edited = (value != self.baseline).then_some(value);
        value
    }

    pub fn step_up(&mut self) -> f64 {
        self.set_edited(self.current() + EDIT_STEP)
    }

    pub fn step_down(&mut self) -> f64 {
        self.set_edited(self.current() - EDIT_STEP)
    }

    /// Drop any pending edit.
    pub fn discard_edit(&mut self) {
        self.edited = None;
    }

    /// Record a successful write: the written value becomes the new baseline.
    pub fn mark_saved(&mut self, written: f64) {
        self.baseline = written;
        self.edited = None;
    }
}

/// Snap to the nearest half unit and clamp at zero. Non-finite input reads as 0.
pub fn clamp_half(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    round_half(value).max(0.0)
}

/// Parse user input for a field value. Accepts `,` as decimal separator.
pub fn parse_value(input: &str) -> Result<f64, CoreError> {
    let normalized = input.trim().replace(',', ".");
    let value: f64 = normalized
        .parse()
        .map_err(|_| CoreError::Validation(format!("'{input}' is not a number")))?;
    if !value.is_finite() {
        return Err(CoreError::Validation(format!("'{input}' is not a finite number")));
    }
    Ok(clamp_half(value))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn item(baseline: f64) -> LocalItem {
        LocalItem::from_entity(Entity {
            key: "ABC-1".into(),
            id: Some(10001),
            summary: "Do the thing".into(),
            field_value: baseline,
        })
    }

    #[test]
    fn refreshed_item_is_clean() {
        let it = item(5.0);
        assert!(!it.is_dirty());
        assert_eq!(it.edited(), None);
        assert_eq!(it.current(), 5.0);
    }

    #[test]
    fn edit_marks_dirty() {
        let mut it = item(5.0);
        assert_eq!(it.set_edited(3.0), 3.0);
        assert!(it.is_dirty());
        assert_eq!(it.edited(), Some(3.0));
    }

    #[test]
    fn edit_back_to_baseline_is_clean() {
        let mut it = item(5.0);
        it.set_edited(3.0);
        it.set_edited(5.0);
        assert!(!it.is_dirty());
    }

    #[test]
    fn steps_move_by_half_and_stop_at_zero() {
        let mut it = item(0.5);
        assert_eq!(it.step_up(), 1.0);
        assert_eq!(it.step_down(), 0.5);
        assert_eq!(it.step_down(), 0.0);
        assert_eq!(it.step_down(), 0.0);
        assert!(it.is_dirty());
    }

    #[test]
    fn edits_are_snapped() {
        let mut it = item(1.0);
        assert_eq!(it.set_edited(2.3), 2.5);
        assert_eq!(it.set_edited(-4.0), 0.0);
        assert_eq!(it.set_edited(f64::NAN), 0.0);
    }

    #[test]
    fn mark_saved_resets_baseline() {
        let mut it = item(5.0);
        it.set_edited(3.0);
        it.mark_saved(2.0);
        assert_eq!(it.baseline, 2.0);
        assert!(!it.is_dirty());
        assert_eq!(it.current(), 2.0);
    }

    #[test]
    fn parse_value_accepts_comma() {
        assert_eq!(parse_value("2,5").unwrap(), 2.5);
        assert_eq!(parse_value(" 3 ").unwrap(), 3.0);
        assert!(parse_value("three").is_err());
        assert!(parse_value("inf").is_err());
    }
}
