//! Shared data-model types: `SensorSample`, `WarningVector`, `LstmLabel`,
//! `CalibrationBias`, and the speed source tag.
//!
//! These are the pipeline's vocabulary types — plain value types with no
//! I/O, matching the design note to model state as small structs with pure
//! update functions rather than hidden globals.

use serde::{Deserialize, Serialize};

/// Upper bound on any emitted speed, km/h (§3: clamp to 300; §4.5 clamps
/// the integrator to 83.333 m/s, i.e. exactly this value).
pub const MAX_SPEED_KMH: f64 = 300.0;

/// Where a speed value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeedSource {
    /// Fresh, valid GNSS fix.
    Gps,
    /// Integrated accelerometer, GNSS fresh or absent.
    Accel,
    /// Integrated accelerometer, falling back because the last GNSS fix is
    /// stale.
    AccelGpsStale,
}

impl std::fmt::Display for SpeedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SpeedSource::Gps => "GPS",
            SpeedSource::Accel => "ACCEL",
            SpeedSource::AccelGpsStale => "ACCEL(GPS_STALE)",
        };
        f.write_str(s)
    }
}

/// One fused sensor sample, as produced by the sampler each tick (§3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    /// Monotonic-within-ride millisecond timestamp.
    pub t_ms: i64,
    pub acc_x: f64,
    pub acc_y: f64,
    pub acc_z: f64,
    pub gyro_x: f64,
    pub gyro_y: f64,
    pub gyro_z: f64,
    /// `None` represents "unavailable" (sentinel 0.0 in shared memory,
    /// null in CSV).
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub speed_kmh: f64,
    pub speed_limit_kmh: f64,
    /// Provenance of `speed_kmh`.
    pub source: SpeedSource,
}

impl SensorSample {
    /// Clamp `speed_kmh` into `[0, MAX_SPEED_KMH]`, the invariant every
    /// emitted sample must satisfy.
    pub fn clamp_speed(&mut self) {
        self.speed_kmh = self.speed_kmh.clamp(0.0, MAX_SPEED_KMH);
    }
}

/// The six rule-based warning flags, in their fixed bit order (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WarningVector {
    pub overspeed: bool,
    pub bump: bool,
    pub pothole: bool,
    pub speedy_turn: bool,
    pub harsh_brake: bool,
    pub sudden_accel: bool,
}

impl WarningVector {
    /// The flags in §3's fixed order, for CSV/telemetry serialization.
    pub const NAMES: [&'static str; 6] = [
        "overspeed",
        "bump",
        "pothole",
        "speedy_turn",
        "harsh_brake",
        "sudden_accel",
    ];

    /// As a `[bool; 6]` in fixed order.
    pub fn as_array(&self) -> [bool; 6] {
        [
            self.overspeed,
            self.bump,
            self.pothole,
            self.speedy_turn,
            self.harsh_brake,
            self.sudden_accel,
        ]
    }

    /// Comma-joined list of currently active warning names, as written into
    /// `warnings_{ride_id}.csv` (§4.7).
    pub fn active_names_csv(&self) -> String {
        self.as_array()
            .iter()
            .zip(Self::NAMES.iter())
            .filter(|(active, _)| **active)
            .map(|(_, name)| *name)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// The learned classifier's output class (§3, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LstmLabel {
    Bump,
    Left,
    Right,
    Stop,
    Straight,
}

impl LstmLabel {
    /// Alphabetical class order the softmax output uses (§4.7).
    pub const ORDER: [LstmLabel; 5] = [
        LstmLabel::Bump,
        LstmLabel::Left,
        LstmLabel::Right,
        LstmLabel::Stop,
        LstmLabel::Straight,
    ];

    /// Class name matching §4.7's header/label text.
    pub fn as_str(&self) -> &'static str {
        match self {
            LstmLabel::Bump => "BUMP",
            LstmLabel::Left => "LEFT",
            LstmLabel::Right => "RIGHT",
            LstmLabel::Stop => "STOP",
            LstmLabel::Straight => "STRAIGHT",
        }
    }

    /// Gates the speedy-turn detector (§4.7 rule 4).
    pub fn gates_speedy_turn(&self) -> bool {
        matches!(self, LstmLabel::Left | LstmLabel::Right)
    }
}

impl std::fmt::Display for LstmLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-axis zero-bias calibration computed once at startup (§3, §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CalibrationBias {
    pub accel_bias: (f64, f64, f64),
    pub gyro_bias: (f64, f64, f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_clamp_respects_bounds() {
        let mut s = sample_with_speed(500.0);
        s.clamp_speed();
        assert_eq!(s.speed_kmh, MAX_SPEED_KMH);

        let mut s = sample_with_speed(-10.0);
        s.clamp_speed();
        assert_eq!(s.speed_kmh, 0.0);
    }

    #[test]
    fn warning_vector_active_names_in_fixed_order() {
        let wv = WarningVector {
            overspeed: true,
            speedy_turn: true,
            ..Default::default()
        };
        assert_eq!(wv.active_names_csv(), "overspeed,speedy_turn");
    }

    #[test]
    fn lstm_label_gates_speedy_turn_only_for_turns() {
        assert!(LstmLabel::Left.gates_speedy_turn());
        assert!(LstmLabel::Right.gates_speedy_turn());
        assert!(!LstmLabel::Straight.gates_speedy_turn());
        assert!(!LstmLabel::Bump.gates_speedy_turn());
    }

    fn sample_with_speed(speed_kmh: f64) -> SensorSample {
        SensorSample {
            t_ms: 0,
            acc_x: 0.0,
            acc_y: 0.0,
            acc_z: 0.0,
            gyro_x: 0.0,
            gyro_y: 0.0,
            gyro_z: 0.0,
            lat: None,
            lon: None,
            speed_kmh,
            speed_limit_kmh: 0.0,
            source: SpeedSource::Accel,
        }
    }
}
