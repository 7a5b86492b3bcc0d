//! Sensor adapters (C1), IMU reader & bias corrector (C2), speed estimator
//! (C3), and GNSS reader (C4).
//!
//! Hardware drivers are an explicit external collaborator (§1 Non-goals);
//! this crate specifies only the sampling *contract* — a pluggable
//! `ImuDriver`/`GnssDriver` trait pair grounded on the teacher's
//! `HalDriver` pattern — plus a simulation implementation of each so the
//! pipeline runs end to end without real hardware attached.

pub mod drivers;
pub mod gnss;
pub mod imu;
pub mod nmea;
pub mod speed;

pub use drivers::{GnssDriver, GnssReading, ImuDriver, ImuReading};
pub use gnss::{GnssFix, GnssReader};
pub use imu::ImuReader;
pub use nmea::{NmeaError, RmcFix};
pub use ridesense_common::model::CalibrationBias;
pub use speed::SpeedEstimator;
