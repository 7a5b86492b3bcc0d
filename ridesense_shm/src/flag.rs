//! The ride-control flag region (`two_wheeler_ride_flag`, 24 B): three
//! int64 words, `[active, ride_id, calculate_model]`. `calculate_model`
//! mirrors the backend's `ride_status.calculate_model` field and gates
//! whether the warning engine's classifier thread may publish its LSTM
//! label upstream (SPEC_FULL.md Section C).

use crate::error::ShmResult;
use crate::region::{create_region, open_region};
use memmap2::MmapMut;
use std::sync::atomic::{AtomicI64, Ordering};

/// OS-level name of the ride flag region.
pub const RIDE_FLAG_NAME: &str = "two_wheeler_ride_flag";

/// Size in bytes of the flag region (three int64 words).
pub const FLAG_BYTES: usize = 24;

fn words(mmap: &MmapMut) -> &[AtomicI64; 3] {
    debug_assert_eq!(mmap.len(), FLAG_BYTES);
    unsafe { &*(mmap.as_ptr() as *const [AtomicI64; 3]) }
}

/// Writer side of the ride flag. Owned exclusively by the ride controller.
pub struct FlagWriter {
    mmap: MmapMut,
}

impl FlagWriter {
    /// Create (or replace) the ride flag region, initialized to
    /// `(0, 0, false)`.
    pub fn create() -> ShmResult<Self> {
        let mmap = create_region(RIDE_FLAG_NAME, FLAG_BYTES)?;
        let w = Self { mmap };
        w.set(0, 0, false);
        Ok(w)
    }

    /// Set `(active, ride_id, calculate_model)`. The integer atomicity of
    /// each word is the only synchronization relied on between writer and
    /// readers.
    pub fn set(&self, active: i64, ride_id: i64, calculate_model: bool) {
        let words = words(&self.mmap);
        words[0].store(active, Ordering::Release);
        words[1].store(ride_id, Ordering::Release);
        words[2].store(calculate_model as i64, Ordering::Release);
    }

    /// Read back the currently published flag.
    pub fn get(&self) -> (i64, i64, bool) {
        let words = words(&self.mmap);
        (
            words[0].load(Ordering::Acquire),
            words[1].load(Ordering::Acquire),
            words[2].load(Ordering::Acquire) != 0,
        )
    }
}

/// Reader side of the ride flag. Owned by the warning engine.
pub struct FlagReader {
    mmap: MmapMut,
}

impl FlagReader {
    /// Attach to an existing ride flag region.
    pub fn attach() -> ShmResult<Self> {
        let mmap = open_region(RIDE_FLAG_NAME, FLAG_BYTES)?;
        Ok(Self { mmap })
    }

    /// Poll the current `(active, ride_id, calculate_model)` triple.
    pub fn get(&self) -> (i64, i64, bool) {
        let words = words(&self.mmap);
        (
            words[0].load(Ordering::Acquire),
            words[1].load(Ordering::Acquire),
            words[2].load(Ordering::Acquire) != 0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // The flag region has a fixed OS-level name; serialize tests that
    // create/recreate it so they don't race each other.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn starts_idle() {
        let _guard = TEST_LOCK.lock().unwrap();
        let writer = FlagWriter::create().expect("create");
        assert_eq!(writer.get(), (0, 0, false));
    }

    #[test]
    fn set_is_visible_to_reader() {
        let _guard = TEST_LOCK.lock().unwrap();
        let writer = FlagWriter::create().expect("create");
        writer.set(1, 7, true);
        let reader = FlagReader::attach().expect("attach");
        assert_eq!(reader.get(), (1, 7, true));
    }
}
