//! # Ride Sensor Shared-Memory Bridge
//!
//! Single-slot, lock-free shared memory carrying one batch of 104 sensor
//! samples from the sampler process to the warning engine, plus a small
//! ride-control flag word.
//!
//! Unlike a general-purpose segment system with version counters and
//! variable sizing, this bridge has exactly two fixed-size OS-named regions:
//!
//! - [`batch::SENSOR_DATA_NAME`] (9152 B): 104 rows × 11 float64 fields.
//! - [`flag::RIDE_FLAG_NAME`] (24 B): `[active, ride_id, calculate_model]`
//!   int64 words.
//!
//! There is no lock between writer and reader. The writer replaces the full
//! batch contents in one copy; a reader takes its own by-value snapshot and
//! accepts that a concurrent write may tear a snapshot at a row boundary.
//! This is deliberate: detectors consume batch-wide statistics, so an
//! occasionally torn row does not change their verdict, and a lock would
//! reintroduce producer blocking the fixed-rate sampler cannot afford.

#![warn(clippy::all)]

pub mod batch;
pub mod error;
pub mod flag;
mod region;

pub use batch::{Batch, BatchReader, BatchRow, BatchWriter, DATA_BYTES, FIELDS_PER_ROW, ROWS_PER_BATCH};
pub use error::{ShmError, ShmResult};
pub use flag::{FlagReader, FlagWriter, FLAG_BYTES, RIDE_FLAG_NAME};
