//! Pluggable sensor driver traits (C1) and their simulation implementations.
//!
//! Grounded on the teacher's `HalDriver` trait: a thin, `Send`-bound
//! interface the reader threads call into, with a real driver (I2C/serial,
//! out of scope per the Non-goals) and a simulation driver satisfying the
//! same contract.

use std::time::Instant;

/// One raw IMU reading, units of g (accel) and deg/s (gyro) — the units
/// `get_latest_mpu()` returns per §4.1, before bias correction.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImuReading {
    pub acc_x: f64,
    pub acc_y: f64,
    pub acc_z: f64,
    pub gyro_x: f64,
    pub gyro_y: f64,
    pub gyro_z: f64,
}

/// One raw GNSS fix, pre-parse: the raw NMEA-like "RMC" line (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GnssReading {
    pub rmc_line: String,
}

/// Errors a driver read can raise. The reader threads never propagate
/// these — they retain the previous value and log (§7: transient I/O).
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("device read failed: {0}")]
    ReadFailed(String),
    #[error("device absent")]
    Absent,
}

/// Pluggable IMU driver contract.
pub trait ImuDriver: Send {
    /// Read one raw sample. `Err` on transient failure; the caller retains
    /// its previous sample (§4.1).
    fn read(&mut self) -> Result<ImuReading, DriverError>;
}

/// Pluggable GNSS driver contract.
pub trait GnssDriver: Send {
    /// Read one raw NMEA-like line, if a new one is available.
    fn read_line(&mut self) -> Result<GnssReading, DriverError>;
}

/// Simulation IMU driver: a deterministic piecewise-constant acceleration
/// replay, driven by wall-clock offsets from its construction time. Used
/// both for development and for the scripted end-to-end scenarios in §8
/// (e.g. "0.5g for 2s then 0g for 2s").
pub struct SimulationImuDriver {
    started: Instant,
    /// `(until_secs, acc_x_g)` pairs, in increasing `until_secs` order. The
    /// last entry's value holds forever after its `until_secs`.
    segments: Vec<(f64, f64)>,
}

impl SimulationImuDriver {
    /// A driver that reports a constant `acc_x_g` forever (gyro/y/z at
    /// rest).
    pub fn constant(acc_x_g: f64) -> Self {
        Self {
            started: Instant::now(),
            segments: vec![(f64::INFINITY, acc_x_g)],
        }
    }

    /// A driver that replays `segments` (elapsed-seconds boundary, acc_x in
    /// g) in sequence, holding the last value once all boundaries pass.
    pub fn replay(segments: Vec<(f64, f64)>) -> Self {
        Self {
            started: Instant::now(),
            segments,
        }
    }
}

impl ImuDriver for SimulationImuDriver {
    fn read(&mut self) -> Result<ImuReading, DriverError> {
        let elapsed = self.started.elapsed().as_secs_f64();
        let acc_x = self
            .segments
            .iter()
            .find(|(until, _)| elapsed < *until)
            .or_else(|| self.segments.last())
            .map(|(_, v)| *v)
            .unwrap_or(0.0);
        Ok(ImuReading {
            acc_x,
            acc_y: 0.0,
            acc_z: 1.0,
            gyro_x: 0.0,
            gyro_y: 0.0,
            gyro_z: 0.0,
        })
    }
}

/// Simulation GNSS driver: replays a fixed sequence of RMC lines, one per
/// call, holding the last line once exhausted. An empty sequence simulates
/// "no GNSS device" (§7: device absent at startup).
pub struct SimulationGnssDriver {
    lines: Vec<String>,
    next: usize,
}

impl SimulationGnssDriver {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines, next: 0 }
    }

    /// No device attached: every read fails.
    pub fn absent() -> Self {
        Self {
            lines: Vec::new(),
            next: 0,
        }
    }
}

impl GnssDriver for SimulationGnssDriver {
    fn read_line(&mut self) -> Result<GnssReading, DriverError> {
        if self.lines.is_empty() {
            return Err(DriverError::Absent);
        }
        let idx = self.next.min(self.lines.len() - 1);
        self.next += 1;
        Ok(GnssReading {
            rmc_line: self.lines[idx].clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_driver_holds_value() {
        let mut d = SimulationImuDriver::constant(0.5);
        let r = d.read().unwrap();
        assert_eq!(r.acc_x, 0.5);
    }

    #[test]
    fn absent_gnss_always_errs() {
        let mut d = SimulationGnssDriver::absent();
        assert!(d.read_line().is_err());
    }

    #[test]
    fn gnss_replay_holds_last_line() {
        let mut d = SimulationGnssDriver::new(vec!["a".into(), "b".into()]);
        assert_eq!(d.read_line().unwrap().rmc_line, "a");
        assert_eq!(d.read_line().unwrap().rmc_line, "b");
        assert_eq!(d.read_line().unwrap().rmc_line, "b");
    }
}
