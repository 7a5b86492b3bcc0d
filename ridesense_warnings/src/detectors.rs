//! The six rule-based warning detectors (§4.7 rules 1, 3-6). Each is a pure
//! function over a read-only batch snapshot so it can run on its own
//! worker thread with no shared mutable state beyond its own slot.

use ridesense_shm::batch::Batch;

/// Rule 1: `any(B.speed > B.speed_limit)`. No buffer applied.
pub fn overspeed(batch: &Batch) -> bool {
    batch.iter().any(|row| row.speed > row.speed_limit)
}

/// Rule 3: vertical-acceleration spike, `any(|acc_z - 9.8| > 2.5 m/s^2)`.
pub fn pothole(batch: &Batch) -> bool {
    batch.iter().any(|row| (row.acc_z - 9.8).abs() > 2.5)
}

/// Rule 4: gated on the latest `LstmLabel` being a turn. When gated,
/// `any(|gyro_z| > 0.5 rad/s AND speed > 20 km/h)`.
pub fn speedy_turn(batch: &Batch, gated: bool) -> bool {
    gated
        && batch
            .iter()
            .any(|row| row.gyro_z.abs() > 0.5 && row.speed > 20.0)
}

/// Per-sample jerk of `acc_x`, `(acc_x[i+1] - acc_x[i]) / (t[i+1] - t[i])`.
fn jerk(batch: &Batch) -> Vec<f64> {
    batch
        .windows(2)
        .map(|w| {
            let dt = w[1].t_sec - w[0].t_sec;
            if dt == 0.0 {
                0.0
            } else {
                (w[1].acc_x - w[0].acc_x) / dt
            }
        })
        .collect()
}

/// Rule 5: `min(jerk) < -4 m/s^3 OR mean(jerk) < -2 m/s^3`.
pub fn harsh_brake(batch: &Batch) -> bool {
    let j = jerk(batch);
    if j.is_empty() {
        return false;
    }
    let min = j.iter().cloned().fold(f64::INFINITY, f64::min);
    let mean = j.iter().sum::<f64>() / j.len() as f64;
    min < -4.0 || mean < -2.0
}

/// Least-squares slope of `y` against `x`.
fn linreg_slope(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    let x_mean = x.iter().sum::<f64>() / n;
    let y_mean = y.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (xi, yi) in x.iter().zip(y.iter()) {
        num += (xi - x_mean) * (yi - y_mean);
        den += (xi - x_mean).powi(2);
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// Rule 6: `slope(acc_x over t) > 3.5 OR max(jerk) > 7`.
pub fn sudden_accel(batch: &Batch) -> bool {
    let j = jerk(batch);
    let max_jerk = j.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let t: Vec<f64> = batch.iter().map(|r| r.t_sec).collect();
    let acc_x: Vec<f64> = batch.iter().map(|r| r.acc_x).collect();
    let slope = linreg_slope(&t, &acc_x);

    slope > 3.5 || max_jerk > 7.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridesense_shm::batch::{BatchRow, ROWS_PER_BATCH};

    fn flat_batch() -> Batch {
        let mut batch: Batch = [BatchRow::default(); ROWS_PER_BATCH];
        for (i, row) in batch.iter_mut().enumerate() {
            row.t_sec = i as f64 * 0.01;
            row.acc_z = 9.8;
            row.speed = 30.0;
            row.speed_limit = 50.0;
        }
        batch
    }

    #[test]
    fn overspeed_fires_on_any_row_over_limit() {
        let mut batch = flat_batch();
        assert!(!overspeed(&batch));
        batch[50].speed = 60.0;
        batch[50].speed_limit = 50.0;
        assert!(overspeed(&batch));
    }

    #[test]
    fn pothole_fires_on_single_spike() {
        let mut batch = flat_batch();
        assert!(!pothole(&batch));
        batch[10].acc_z = 13.0;
        assert!(pothole(&batch));
    }

    #[test]
    fn speedy_turn_requires_gate_and_speed() {
        let mut batch = flat_batch();
        for row in batch.iter_mut() {
            row.gyro_z = 0.8;
            row.speed = 60.0;
        }
        assert!(!speedy_turn(&batch, false), "ungated must stay 0");
        assert!(speedy_turn(&batch, true));

        let mut slow_batch = flat_batch();
        for row in slow_batch.iter_mut() {
            row.gyro_z = 0.8;
            row.speed = 10.0;
        }
        assert!(!speedy_turn(&slow_batch, true), "below 20 km/h never fires");
    }

    #[test]
    fn harsh_brake_fires_on_sharp_negative_jerk() {
        let mut batch = flat_batch();
        assert!(!harsh_brake(&batch));
        batch[20].acc_x = 2.0;
        batch[21].acc_x = -3.0;
        assert!(harsh_brake(&batch));
    }

    #[test]
    fn sudden_accel_fires_on_rising_acc_x_slope() {
        let mut batch = flat_batch();
        assert!(!sudden_accel(&batch));
        for (i, row) in batch.iter_mut().enumerate() {
            row.acc_x = i as f64 * 0.5;
        }
        assert!(sudden_accel(&batch));
    }

    #[test]
    fn sudden_accel_fires_on_single_sharp_positive_jerk() {
        let mut batch = flat_batch();
        batch[40].acc_x = 0.0;
        batch[41].acc_x = 10.0;
        assert!(sudden_accel(&batch));
    }
}
