//! The single-slot sensor batch region (`two_wheeler_sensor_data`, 9152 B).
//!
//! One [`BatchWriter`] (owned by the sampler) and any number of
//! [`BatchReader`]s (owned by the warning engine) map the same backing file.
//! There is deliberately no lock between them: the writer replaces the full
//! 104-row contents in one `memcpy`, and a reader that samples mid-write may
//! observe a torn batch. This is the rationale in the sampler/warning-engine
//! design: detectors operate on batch statistics, so an occasional torn row
//! does not change their verdict.

use crate::error::ShmResult;
use crate::region::{create_region, open_region};
use memmap2::MmapMut;

/// Number of samples in one batch.
pub const ROWS_PER_BATCH: usize = 104;

/// Number of float64 fields per sample row.
pub const FIELDS_PER_ROW: usize = 11;

/// Size in bytes of the data region (104 * 11 * 8).
pub const DATA_BYTES: usize = ROWS_PER_BATCH * FIELDS_PER_ROW * std::mem::size_of::<f64>();

/// OS-level name of the sensor data region.
pub const SENSOR_DATA_NAME: &str = "two_wheeler_sensor_data";

const _: () = assert!(DATA_BYTES == 9152);

/// One sensor sample as it appears in the shared-memory batch, field order
/// fixed by the wire layout: `t_sec, acc_{x,y,z}, gyro_{x,y,z}, lat, lon,
/// speed, speed_limit`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatchRow {
    /// Float-seconds timestamp.
    pub t_sec: f64,
    /// Accelerometer X, g.
    pub acc_x: f64,
    /// Accelerometer Y, g.
    pub acc_y: f64,
    /// Accelerometer Z, g.
    pub acc_z: f64,
    /// Gyroscope X, rad/s.
    pub gyro_x: f64,
    /// Gyroscope Y, rad/s.
    pub gyro_y: f64,
    /// Gyroscope Z, rad/s.
    pub gyro_z: f64,
    /// Latitude, degrees; 0.0 means unavailable.
    pub lat: f64,
    /// Longitude, degrees; 0.0 means unavailable.
    pub lon: f64,
    /// Speed, km/h.
    pub speed: f64,
    /// Speed limit, km/h.
    pub speed_limit: f64,
}

const _: () = assert!(std::mem::size_of::<BatchRow>() == FIELDS_PER_ROW * 8);

/// A full batch of 104 rows, the unit exchanged through shared memory.
pub type Batch = [BatchRow; ROWS_PER_BATCH];

/// Writer side of the sensor batch region. Owned exclusively by the sampler.
pub struct BatchWriter {
    mmap: MmapMut,
}

impl BatchWriter {
    /// Create (or re-create, unlinking any stale region) the sensor data
    /// region.
    pub fn create() -> ShmResult<Self> {
        let mmap = create_region(SENSOR_DATA_NAME, DATA_BYTES)?;
        Ok(Self { mmap })
    }

    /// Replace the full batch contents with `batch`. Not partial: the whole
    /// 9152-byte region is overwritten in one copy.
    pub fn write_batch(&mut self, batch: &Batch) {
        let bytes = unsafe {
            std::slice::from_raw_parts(batch.as_ptr() as *const u8, DATA_BYTES)
        };
        self.mmap[..].copy_from_slice(bytes);
    }
}

/// Reader side of the sensor batch region. Owned by the warning engine; many
/// reader instances may attach concurrently, each taking its own snapshot.
pub struct BatchReader {
    mmap: MmapMut,
}

impl BatchReader {
    /// Attach to an existing sensor data region.
    pub fn attach() -> ShmResult<Self> {
        let mmap = open_region(SENSOR_DATA_NAME, DATA_BYTES)?;
        Ok(Self { mmap })
    }

    /// Take an atomic-by-value snapshot of the current batch contents.
    /// Tearing at a row boundary is accepted (see module docs).
    pub fn read_batch(&self) -> Batch {
        let mut out: Batch = [BatchRow::default(); ROWS_PER_BATCH];
        let dst = unsafe {
            std::slice::from_raw_parts_mut(out.as_mut_ptr() as *mut u8, DATA_BYTES)
        };
        dst.copy_from_slice(&self.mmap[..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // The batch region has a fixed OS-level name; serialize tests that
    // create/recreate it so they don't race each other.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn data_bytes_matches_fixed_layout() {
        assert_eq!(DATA_BYTES, 9152);
    }

    #[test]
    fn write_then_read_preserves_bits() {
        let _guard = TEST_LOCK.lock().unwrap();
        let mut writer = BatchWriter::create().expect("create");
        let mut batch: Batch = [BatchRow::default(); ROWS_PER_BATCH];
        for (i, row) in batch.iter_mut().enumerate() {
            row.t_sec = i as f64 * 0.01;
            row.acc_x = 0.117588;
            row.speed = 42.5;
            row.speed_limit = 50.0;
        }
        writer.write_batch(&batch);

        let reader = BatchReader::attach().expect("attach");
        let round_tripped = reader.read_batch();
        assert_eq!(round_tripped, batch);
    }
}
