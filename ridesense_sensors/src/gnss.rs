//! GNSS reader (C4, §4.2).

use crate::drivers::GnssDriver;
use crate::nmea::parse_rmc;
use tracing::warn;

/// Staleness threshold past which the speed estimator must ignore the GNSS
/// speed regardless of content (§4.2).
pub const STALENESS_MS: u64 = 5_000;

/// Minimum/maximum GNSS speed accepted as valid (§4.2).
const MIN_VALID_SPEED_KMH: f64 = 0.0;
const MAX_VALID_SPEED_KMH: f64 = 300.0;

/// One `get_latest_gps()` result: the retained position, a speed if the
/// latest read produced a valid fix, and the wall-clock timestamp of this
/// read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GnssFix {
    pub lat: f64,
    pub lon: f64,
    /// `None` when the latest read was invalid or absent; the caller (C6)
    /// substitutes the speed estimator's own value in that case.
    pub speed_kmh: Option<f64>,
    pub last_update_wall_ms: u64,
}

/// Polls a [`GnssDriver`] at ≤ 1 Hz (rate enforced by the caller's poll
/// loop) and exposes the `get_latest_gps()` contract.
pub struct GnssReader {
    driver: Box<dyn GnssDriver>,
    lat: f64,
    lon: f64,
    last_update_wall_ms: u64,
}

impl GnssReader {
    pub fn new(driver: Box<dyn GnssDriver>) -> Self {
        Self {
            driver,
            lat: 0.0,
            lon: 0.0,
            last_update_wall_ms: 0,
        }
    }

    /// `get_latest_gps()`: read and parse one RMC record. On any failure —
    /// device error, malformed record, invalid status, or an out-of-range
    /// speed — retains the last known position and reports no speed,
    /// stamping `last_update_wall_ms` to `now_wall_ms` regardless (§4.2).
    pub fn get_latest_gps(&mut self, now_wall_ms: u64) -> GnssFix {
        self.last_update_wall_ms = now_wall_ms;

        let reading = match self.driver.read_line() {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "gnss device read failed");
                return self.retained_fix();
            }
        };

        let fix = match parse_rmc(&reading.rmc_line) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "gnss record malformed");
                return self.retained_fix();
            }
        };

        if !fix.valid {
            return self.retained_fix();
        }

        self.lat = fix.lat;
        self.lon = fix.lon;

        let speed_kmh = fix.speed_kmh.filter(|s| {
            (MIN_VALID_SPEED_KMH..=MAX_VALID_SPEED_KMH).contains(s)
        });

        GnssFix {
            lat: self.lat,
            lon: self.lon,
            speed_kmh,
            last_update_wall_ms: now_wall_ms,
        }
    }

    fn retained_fix(&self) -> GnssFix {
        GnssFix {
            lat: self.lat,
            lon: self.lon,
            speed_kmh: None,
            last_update_wall_ms: self.last_update_wall_ms,
        }
    }

    /// `true` iff the latest read is older than [`STALENESS_MS`].
    pub fn is_stale(&self, now_wall_ms: u64) -> bool {
        now_wall_ms.saturating_sub(self.last_update_wall_ms) > STALENESS_MS
    }

    pub fn last_update_wall_ms(&self) -> u64 {
        self.last_update_wall_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::SimulationGnssDriver;

    fn valid_line(speed_knots: &str) -> String {
        format!("$GPRMC,123519,A,4807.038,N,01131.000,E,{speed_knots},084.4,230394,003.1,W*6A")
    }

    #[test]
    fn valid_fix_reports_speed_and_position() {
        let mut reader = GnssReader::new(Box::new(SimulationGnssDriver::new(vec![valid_line(
            "21.5989",
        )])));
        let fix = reader.get_latest_gps(1_000);
        assert!((fix.lat - 48.1173).abs() < 1e-4);
        assert!((fix.speed_kmh.unwrap() - 40.0).abs() < 0.1);
    }

    #[test]
    fn void_status_retains_position_with_no_speed() {
        let lines = vec![
            valid_line("21.5989"),
            "$GPRMC,123520,V,4807.038,N,01131.000,E,,,230394,,".to_string(),
        ];
        let mut reader = GnssReader::new(Box::new(SimulationGnssDriver::new(lines)));
        reader.get_latest_gps(1_000);
        let fix = reader.get_latest_gps(2_000);
        assert!((fix.lat - 48.1173).abs() < 1e-4);
        assert_eq!(fix.speed_kmh, None);
    }

    #[test]
    fn out_of_range_speed_is_dropped() {
        let mut reader = GnssReader::new(Box::new(SimulationGnssDriver::new(vec![valid_line(
            "500",
        )])));
        let fix = reader.get_latest_gps(1_000);
        assert_eq!(fix.speed_kmh, None);
    }

    #[test]
    fn absent_device_is_never_stale_immediately_but_yields_no_speed() {
        let mut reader = GnssReader::new(Box::new(SimulationGnssDriver::absent()));
        let fix = reader.get_latest_gps(1_000);
        assert_eq!(fix.speed_kmh, None);
        assert!(!reader.is_stale(1_000));
        assert!(reader.is_stale(1_000 + STALENESS_MS + 1));
    }
}
