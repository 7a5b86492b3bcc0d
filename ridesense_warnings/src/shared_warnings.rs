//! Process-wide published state for the Warning Engine: the `WarningVector`
//! and the latest `LstmLabel` (§3 "Ownership"). Each detector writes only
//! its own slot; reads take an atomic-by-value snapshot.

use ridesense_common::model::{LstmLabel, WarningVector};
use std::sync::Mutex;

/// Guards the six warning bits and the classifier's latest label behind
/// one short-critical-section mutex each (§9 design note: recast process-
/// wide mutable state as a small struct behind one or two mutexes).
pub struct SharedWarnings {
    vector: Mutex<WarningVector>,
    label: Mutex<LstmLabel>,
}

impl SharedWarnings {
    pub fn new() -> Self {
        Self {
            vector: Mutex::new(WarningVector::default()),
            label: Mutex::new(LstmLabel::Straight),
        }
    }

    pub fn set_overspeed(&self, v: bool) {
        self.vector.lock().expect("warning vector poisoned").overspeed = v;
    }

    pub fn set_bump(&self, v: bool) {
        self.vector.lock().expect("warning vector poisoned").bump = v;
    }

    pub fn set_pothole(&self, v: bool) {
        self.vector.lock().expect("warning vector poisoned").pothole = v;
    }

    pub fn set_speedy_turn(&self, v: bool) {
        self.vector.lock().expect("warning vector poisoned").speedy_turn = v;
    }

    pub fn set_harsh_brake(&self, v: bool) {
        self.vector.lock().expect("warning vector poisoned").harsh_brake = v;
    }

    pub fn set_sudden_accel(&self, v: bool) {
        self.vector.lock().expect("warning vector poisoned").sudden_accel = v;
    }

    /// Atomic snapshot of all six bits.
    pub fn snapshot(&self) -> WarningVector {
        *self.vector.lock().expect("warning vector poisoned")
    }

    pub fn set_label(&self, label: LstmLabel) {
        *self.label.lock().expect("label poisoned") = label;
    }

    pub fn label(&self) -> LstmLabel {
        *self.label.lock().expect("label poisoned")
    }
}

impl Default for SharedWarnings {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_all_flags_clear_and_straight_label() {
        let shared = SharedWarnings::new();
        assert_eq!(shared.snapshot(), WarningVector::default());
        assert_eq!(shared.label(), LstmLabel::Straight);
    }

    #[test]
    fn each_setter_touches_only_its_own_bit() {
        let shared = SharedWarnings::new();
        shared.set_pothole(true);
        let snap = shared.snapshot();
        assert!(snap.pothole);
        assert!(!snap.overspeed && !snap.bump && !snap.speedy_turn);
        assert!(!snap.harsh_brake && !snap.sudden_accel);
    }

    #[test]
    fn label_updates_are_visible_across_snapshots() {
        let shared = SharedWarnings::new();
        shared.set_label(LstmLabel::Left);
        assert_eq!(shared.label(), LstmLabel::Left);
    }
}
