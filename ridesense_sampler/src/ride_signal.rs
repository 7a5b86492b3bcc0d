//! Cross-thread signal from the Ride Controller (C8) to the sampler tick
//! loop: the current ride id, and a one-shot "reset the estimator and
//! clear the batch buffer" pulse raised on every IDLE → ACTIVE edge.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub struct RideSignal {
    active: AtomicBool,
    ride_id: Mutex<Option<String>>,
    reset_pending: AtomicBool,
}

impl RideSignal {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            ride_id: Mutex::new(None),
            reset_pending: AtomicBool::new(false),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    #[allow(dead_code)]
    pub fn ride_id(&self) -> Option<String> {
        self.ride_id.lock().expect("ride_id lock poisoned").clone()
    }

    /// IDLE → ACTIVE: the controller calls this once per ride start.
    pub fn start(&self, ride_id: String) {
        *self.ride_id.lock().expect("ride_id lock poisoned") = Some(ride_id);
        self.active.store(true, Ordering::Release);
        self.reset_pending.store(true, Ordering::Release);
    }

    /// ACTIVE → IDLE.
    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// The sampler tick loop calls this once per tick; returns `true`
    /// exactly once per ride start, consuming the pulse.
    pub fn take_reset_pulse(&self) -> bool {
        self.reset_pending.swap(false, Ordering::AcqRel)
    }
}

impl Default for RideSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_pulse_fires_exactly_once() {
        let sig = RideSignal::new();
        sig.start("7".to_string());
        assert!(sig.is_active());
        assert_eq!(sig.ride_id(), Some("7".to_string()));
        assert!(sig.take_reset_pulse());
        assert!(!sig.take_reset_pulse());
    }

    #[test]
    fn stop_clears_active_but_keeps_ride_id() {
        let sig = RideSignal::new();
        sig.start("7".to_string());
        sig.stop();
        assert!(!sig.is_active());
        assert_eq!(sig.ride_id(), Some("7".to_string()));
    }
}
