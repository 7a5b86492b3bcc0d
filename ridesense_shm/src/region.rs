//! Low-level helpers for mapping a fixed-size, OS-named `/dev/shm` region.
//!
//! Grounded on the teacher's `platform::linux::create_segment_mmap`, trimmed
//! to the fixed-size, no-header case this bridge needs: every region here is
//! exactly the size the spec names, with no embedded header or version
//! counter.

use crate::error::{ShmError, ShmResult};
use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;

fn path_for(name: &str) -> String {
    format!("/dev/shm/{name}")
}

/// Create (or replace) a fixed-size shared-memory region.
///
/// If a region of this name already exists from a previous run, it is
/// unlinked and recreated — the "shared-memory creation race" handling
/// called for when the slot already exists at startup.
pub fn create_region(name: &str, size: usize) -> ShmResult<MmapMut> {
    let path = path_for(name);
    if std::path::Path::new(&path).exists() {
        let _ = std::fs::remove_file(&path);
    }

    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .mode(0o600)
        .open(&path)
        .map_err(|source| ShmError::Create {
            name: name.to_string(),
            source,
        })?;
    file.set_len(size as u64).map_err(|source| ShmError::Create {
        name: name.to_string(),
        source,
    })?;

    let mmap = unsafe { MmapOptions::new().map_mut(&file) }.map_err(|source| ShmError::Create {
        name: name.to_string(),
        source,
    })?;
    Ok(mmap)
}

/// Attach to an existing region, verifying its size matches what the caller
/// expects.
pub fn open_region(name: &str, expected_size: usize) -> ShmResult<MmapMut> {
    let path = path_for(name);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&path)
        .map_err(|source| ShmError::Attach {
            name: name.to_string(),
            source,
        })?;

    let found = file
        .metadata()
        .map_err(|source| ShmError::Attach {
            name: name.to_string(),
            source,
        })?
        .len() as usize;
    if found != expected_size {
        return Err(ShmError::SizeMismatch {
            name: name.to_string(),
            expected: expected_size,
            found,
        });
    }

    let mmap = unsafe { MmapOptions::new().map_mut(&file) }.map_err(|source| ShmError::Attach {
        name: name.to_string(),
        source,
    })?;
    Ok(mmap)
}
