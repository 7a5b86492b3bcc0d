//! IMU reader & bias corrector (C2, §4.1).

use crate::drivers::{ImuDriver, ImuReading};
use ridesense_common::model::CalibrationBias;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

/// Auxiliary state published for the speed estimator: the most recent raw
/// (pre-calibration) x-axis acceleration, in m/s², plus the decimal
/// precision observed in the raw g-reading — used as the rounding scale for
/// the derived speed (§4.1).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct RawAccelState {
    acc_x_mps2: f64,
    acc_x_g: f64,
    precision: usize,
}

/// Polls an [`ImuDriver`], applies startup bias calibration, and exposes the
/// `get_latest_mpu()` contract plus the raw-acceleration side channel C3
/// reads from.
pub struct ImuReader {
    driver: Box<dyn ImuDriver>,
    bias: CalibrationBias,
    last_sample: ImuReading,
    raw: Mutex<RawAccelState>,
}

/// Number of non-trailing-zero fractional digits in `value`'s default
/// formatting, capped to avoid pathological float noise.
fn decimal_precision(value: f64) -> usize {
    let text = format!("{value}");
    match text.split_once('.') {
        Some((_, frac)) => frac.trim_end_matches('0').len().min(6),
        None => 0,
    }
}

impl ImuReader {
    /// Reset the device, then collect samples for `calibration`, averaging
    /// per axis to produce the zero-bias offsets. An empty calibration
    /// window (zero samples collected) logs and proceeds with zero bias
    /// (§7 edge case).
    pub fn calibrate(mut driver: Box<dyn ImuDriver>, calibration: Duration) -> Self {
        let deadline = Instant::now() + calibration;
        let mut sum = ImuReading::default();
        let mut count: u32 = 0;
        while Instant::now() < deadline {
            match driver.read() {
                Ok(r) => {
                    sum.acc_x += r.acc_x;
                    sum.acc_y += r.acc_y;
                    sum.acc_z += r.acc_z;
                    sum.gyro_x += r.gyro_x;
                    sum.gyro_y += r.gyro_y;
                    sum.gyro_z += r.gyro_z;
                    count += 1;
                }
                Err(e) => warn!(error = %e, "imu read failed during calibration"),
            }
        }

        let bias = if count == 0 {
            warn!("imu calibration collected zero samples, proceeding with zero bias");
            CalibrationBias::default()
        } else {
            let n = count as f64;
            CalibrationBias {
                accel_bias: (sum.acc_x / n, sum.acc_y / n, sum.acc_z / n),
                gyro_bias: (sum.gyro_x / n, sum.gyro_y / n, sum.gyro_z / n),
            }
        };

        Self {
            driver,
            bias,
            last_sample: ImuReading::default(),
            raw: Mutex::new(RawAccelState::default()),
        }
    }

    /// `get_latest_mpu()`: bias-corrected `(ax, ay, az, gx, gy, gz)` in g and
    /// deg/s. On driver failure, returns (and logs) the previous sample
    /// rather than propagating — the sampler must never block on this call.
    pub fn get_latest_mpu(&mut self) -> (f64, f64, f64, f64, f64, f64) {
        match self.driver.read() {
            Ok(raw) => {
                self.publish_raw_accel_x(raw.acc_x);
                self.last_sample = raw;
            }
            Err(e) => warn!(error = %e, "imu read failed, reusing previous sample"),
        }

        let s = self.last_sample;
        (
            s.acc_x - self.bias.accel_bias.0,
            s.acc_y - self.bias.accel_bias.1,
            s.acc_z - self.bias.accel_bias.2,
            s.gyro_x - self.bias.gyro_bias.0,
            s.gyro_y - self.bias.gyro_bias.1,
            s.gyro_z - self.bias.gyro_bias.2,
        )
    }

    fn publish_raw_accel_x(&self, acc_x_g: f64) {
        let mut guard = self.raw.lock().expect("raw accel lock poisoned");
        *guard = RawAccelState {
            acc_x_mps2: acc_x_g * 9.81,
            acc_x_g,
            precision: decimal_precision(acc_x_g),
        };
    }

    /// Latest raw (pre-calibration) x-axis acceleration in g, read by the
    /// speed estimator (§4.3 applies `OPTIMAL_BIAS_G` to this value itself).
    pub fn raw_acc_x_g(&self) -> f64 {
        self.raw.lock().expect("raw accel lock poisoned").acc_x_g
    }

    /// Decimal precision observed in the most recent raw reading, used by
    /// the speed estimator to round its derived speed.
    pub fn raw_precision(&self) -> usize {
        self.raw.lock().expect("raw accel lock poisoned").precision
    }

    pub fn bias(&self) -> CalibrationBias {
        self.bias
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::SimulationImuDriver;

    #[test]
    fn calibration_with_zero_samples_uses_zero_bias() {
        let reader = ImuReader::calibrate(
            Box::new(SimulationImuDriver::constant(0.3)),
            Duration::from_secs(0),
        );
        assert_eq!(reader.bias(), CalibrationBias::default());
    }

    #[test]
    fn calibration_averages_constant_driver_to_its_value() {
        let reader = ImuReader::calibrate(
            Box::new(SimulationImuDriver::constant(0.117588)),
            Duration::from_millis(20),
        );
        assert!((reader.bias().accel_bias.0 - 0.117588).abs() < 1e-6);
    }

    #[test]
    fn get_latest_mpu_subtracts_bias() {
        let mut reader = ImuReader::calibrate(
            Box::new(SimulationImuDriver::constant(0.2)),
            Duration::from_millis(20),
        );
        let (ax, _, _, _, _, _) = reader.get_latest_mpu();
        assert!(ax.abs() < 1e-6, "bias-corrected acc_x should be ~0, was {ax}");
    }

    #[test]
    fn decimal_precision_counts_fractional_digits() {
        assert_eq!(decimal_precision(0.1175880), 6);
        assert_eq!(decimal_precision(1.0), 0);
    }
}
