//! Baseline reconciliation.
//!
//! Turns the user's locally intended change into the value to write,
//! given the remote value as it is now. When nobody else touched the
//! field since our baseline was captured the edited value is written
//! verbatim. Otherwise the user's delta is replayed on top of the current
//! remote value so concurrent contributions are kept.
//!
//! Two clients reconciling against the same drifted read can both compute
//! a value from a read the other is about to supersede. The lease
//! serializes the writes, not the reads that fed them.

/// Outcome of [`reconcile_with_drift`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reconciliation {
    /// Value to write to the remote field.
    pub value: f64,
    /// `fresh - baseline`; zero when no concurrent change was detected.
    pub drift: f64,
}

impl Reconciliation {
    pub fn drifted(&self) -> bool {
        self.drift != 0.0
    }
}

/// Value to write for a user edit of `baseline` to `edited` when the remote
/// field currently holds `fresh`.
pub fn reconcile(baseline: f64, edited: f64, fresh: f64) -> f64 {
    reconcile_with_drift(baseline, edited, fresh).value
}

/// [`reconcile`], also reporting how far the remote value drifted.
pub fn reconcile_with_drift(baseline: f64, edited: f64, fresh: f64) -> Reconciliation {
    if fresh == baseline {
        return Reconciliation {
            value: edited,
            drift: 0.0,
        };
    }

    let local_delta = baseline - edited;
    let value = round_half(fresh - local_delta).max(0.0);

    Reconciliation {
        value,
        drift: fresh - baseline,
    }
}

/// Round to the nearest multiple of 0.5.
pub fn round_half(value: f64) -> f64 {
    (value * 2.0).round() / 2.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: [f64; 12] = [0.0, 0.5, 1.0, 1.25, 2.0, 2.5, 3.0, 3.3, 5.0, 8.0, 13.0, 21.0];

    #[test]
    fn no_drift_writes_edit() {
        assert_eq!(reconcile(5.0, 3.0, 5.0), 3.0);
    }

    #[test]
    fn drift_replays_delta() {
        // Someone else already took one point off; our -2 lands on top.
        assert_eq!(reconcile(5.0, 3.0, 4.0), 2.0);
        let r = reconcile_with_drift(5.0, 3.0, 4.0);
        assert!(r.drifted());
        assert_eq!(r.drift, -1.0);
    }

    #[test]
    fn drift_replays_increase() {
        assert_eq!(reconcile(2.0, 3.5, 4.0), 5.5);
    }

    #[test]
    fn no_drift_is_identity_for_all_pairs() {
        for &baseline in &SAMPLES {
            for &edited in &SAMPLES {
                assert_eq!(reconcile(baseline, edited, baseline), edited);
            }
        }
    }

    #[test]
    fn never_negative() {
        for &baseline in &SAMPLES {
            for &edited in &SAMPLES {
                for &fresh in &SAMPLES {
                    assert!(reconcile(baseline, edited, fresh) >= 0.0);
                }
            }
        }
        assert_eq!(reconcile(10.0, 0.0, 3.0), 0.0);
    }

    #[test]
    fn drifted_result_is_half_unit() {
        for &baseline in &SAMPLES {
            for &edited in &SAMPLES {
                for &fresh in &SAMPLES {
                    if fresh == baseline {
                        continue;
                    }
                    let doubled = reconcile(baseline, edited, fresh) * 2.0;
                    assert_eq!(doubled, doubled.trunc());
                }
            }
        }
    }

    #[test]
    fn round_half_snaps() {
        assert_eq!(round_half(2.2), 2.0);
        assert_eq!(round_half(2.3), 2.5);
        assert_eq!(round_half(2.75), 3.0);
        assert_eq!(round_half(0.0), 0.0);
    }
}
