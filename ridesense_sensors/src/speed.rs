//! Speed Estimator (C3, §4.3): GNSS-anchored with calibrated-accelerometer
//! fallback.

use ridesense_common::model::SpeedSource;
use std::time::Instant;

/// Calibrated x-axis accelerometer bias, in g, subtracted before
/// integration. Authoritative per the design note resolving the two bias
/// values found in the source material.
pub const OPTIMAL_BIAS_G: f64 = 0.117588;

/// Below this magnitude (in g, after bias correction) acceleration is
/// treated as noise and zeroed before integration.
const DEADBAND_G: f64 = 0.02;

/// Integrator clamp, m/s (≈ 300 km/h).
const MAX_V_MPS: f64 = 83.333;

const G_TO_MPS2: f64 = 9.81;
const MPS_TO_KMH: f64 = 3.6;

/// GNSS anchor window: speeds at or below this are not trusted as a moving
/// fix (stationary jitter), and the dead zone excludes exactly 0.5 itself.
const GNSS_ANCHOR_MIN_KMH: f64 = 0.5;
const GNSS_ANCHOR_MAX_KMH: f64 = 300.0;

/// Maintains the integrated velocity estimate and produces
/// `final_speed_kmh()` on each call.
pub struct SpeedEstimator {
    v_mps: f64,
    last_update: Option<Instant>,
}

impl Default for SpeedEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeedEstimator {
    pub fn new() -> Self {
        Self {
            v_mps: 0.0,
            last_update: None,
        }
    }

    /// Reset to `v := 0` with the time reference unset, as done at ride
    /// start.
    pub fn reset(&mut self) {
        self.v_mps = 0.0;
        self.last_update = None;
    }

    /// `final_speed_kmh()`. `gnss_speed_kmh`/`gnss_is_stale` come from the
    /// GNSS reader's latest fix; `gnss_ever_locked` distinguishes "never
    /// had a fix" (source `ACCEL`) from "had one, now stale" (source
    /// `ACCEL(GPS_STALE)`); `raw_acc_x_g` is the IMU's raw (pre-calibration)
    /// x-axis reading. `raw_precision` is the decimal precision observed in
    /// that raw reading (§4.1) and is used as the rounding scale for the
    /// accel-derived speed; the GPS-anchored branch reports a measured
    /// value and is not rounded.
    pub fn final_speed_kmh(
        &mut self,
        gnss_speed_kmh: Option<f64>,
        gnss_is_stale: bool,
        gnss_ever_locked: bool,
        raw_acc_x_g: f64,
        raw_precision: usize,
    ) -> (f64, SpeedSource) {
        let now = Instant::now();

        if !gnss_is_stale {
            if let Some(speed) = gnss_speed_kmh {
                if speed > GNSS_ANCHOR_MIN_KMH && speed <= GNSS_ANCHOR_MAX_KMH {
                    self.v_mps = speed / MPS_TO_KMH;
                    self.last_update = Some(now);
                    return (speed, SpeedSource::Gps);
                }
            }
        }

        let dt = self
            .last_update
            .map(|prev| now.duration_since(prev).as_secs_f64())
            .unwrap_or(0.0);
        self.last_update = Some(now);

        let bias_corrected_g = raw_acc_x_g - OPTIMAL_BIAS_G;
        let a_mps2 = if bias_corrected_g.abs() < DEADBAND_G {
            0.0
        } else {
            bias_corrected_g * G_TO_MPS2
        };

        self.v_mps = (self.v_mps + a_mps2 * dt).clamp(0.0, MAX_V_MPS);

        let source = if gnss_ever_locked {
            SpeedSource::AccelGpsStale
        } else {
            SpeedSource::Accel
        };
        (round_to(self.v_mps * MPS_TO_KMH, raw_precision), source)
    }
}

/// Rounds `value` to `precision` fractional digits.
fn round_to(value: f64, precision: usize) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}
