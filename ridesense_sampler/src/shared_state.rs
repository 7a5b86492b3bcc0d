//! Process-wide mutable state shared between the sampler's reader threads
//! and its tick loop (§5 "Shared-resource policy", §9 design note: a small
//! struct behind a couple of mutexes rather than hidden globals).

use std::sync::Mutex;

/// `(ax, ay, az, gx, gy, gz)` as last published by the IMU thread.
pub type MpuTuple = (f64, f64, f64, f64, f64, f64);

/// `latest_mpu`, `latest_gps`, `latest_speed_limit` under one short
/// critical-section mutex (`data_lock`).
struct Inner {
    mpu: MpuTuple,
    raw_precision: usize,
    lat: f64,
    lon: f64,
    gps_speed_kmh: Option<f64>,
    gps_stale: bool,
    gps_ever_locked: bool,
    speed_limit_kmh: f64,
}

pub struct SharedState {
    inner: Mutex<Inner>,
}

impl SharedState {
    pub fn new(initial_speed_limit_kmh: f64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                mpu: (0.0, 0.0, 1.0, 0.0, 0.0, 0.0),
                raw_precision: 0,
                lat: 0.0,
                lon: 0.0,
                gps_speed_kmh: None,
                gps_stale: true,
                gps_ever_locked: false,
                speed_limit_kmh: initial_speed_limit_kmh,
            }),
        }
    }

    pub fn set_mpu(&self, mpu: MpuTuple) {
        self.inner.lock().expect("data_lock poisoned").mpu = mpu;
    }

    pub fn mpu(&self) -> MpuTuple {
        self.inner.lock().expect("data_lock poisoned").mpu
    }

    /// Decimal precision observed in the IMU's most recent raw reading,
    /// published by the IMU thread alongside `mpu` (§4.1/§4.3: rounding
    /// scale for the accel-derived speed).
    pub fn set_raw_precision(&self, precision: usize) {
        self.inner.lock().expect("data_lock poisoned").raw_precision = precision;
    }

    pub fn raw_precision(&self) -> usize {
        self.inner.lock().expect("data_lock poisoned").raw_precision
    }

    pub fn set_gps(
        &self,
        lat: f64,
        lon: f64,
        speed_kmh: Option<f64>,
        stale: bool,
        ever_locked: bool,
    ) {
        let mut guard = self.inner.lock().expect("data_lock poisoned");
        guard.lat = lat;
        guard.lon = lon;
        guard.gps_speed_kmh = speed_kmh;
        guard.gps_stale = stale;
        guard.gps_ever_locked = ever_locked;
    }

    /// `(lat, lon, speed_kmh, stale, ever_locked)`.
    pub fn gps(&self) -> (f64, f64, Option<f64>, bool, bool) {
        let guard = self.inner.lock().expect("data_lock poisoned");
        (
            guard.lat,
            guard.lon,
            guard.gps_speed_kmh,
            guard.gps_stale,
            guard.gps_ever_locked,
        )
    }

    pub fn lat_lon(&self) -> (f64, f64) {
        let guard = self.inner.lock().expect("data_lock poisoned");
        (guard.lat, guard.lon)
    }

    pub fn set_speed_limit(&self, limit_kmh: f64) {
        self.inner.lock().expect("data_lock poisoned").speed_limit_kmh = limit_kmh;
    }

    pub fn speed_limit(&self) -> f64 {
        self.inner.lock().expect("data_lock poisoned").speed_limit_kmh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_each_field_independently() {
        let s = SharedState::new(50.0);
        assert_eq!(s.speed_limit(), 50.0);
        s.set_mpu((0.1, 0.2, 0.3, 0.4, 0.5, 0.6));
        assert_eq!(s.mpu(), (0.1, 0.2, 0.3, 0.4, 0.5, 0.6));
        s.set_raw_precision(6);
        assert_eq!(s.raw_precision(), 6);
        s.set_gps(1.0, 2.0, Some(40.0), false, true);
        assert_eq!(s.gps(), (1.0, 2.0, Some(40.0), false, true));
        s.set_speed_limit(60.0);
        assert_eq!(s.speed_limit(), 60.0);
    }
}
