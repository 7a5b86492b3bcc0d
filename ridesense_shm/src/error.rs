//! Error types for the shared-memory bridge.

use thiserror::Error;

/// Errors that can occur creating, attaching to, or using a shared-memory
/// region.
#[derive(Error, Debug)]
pub enum ShmError {
    /// Backing file or mapping could not be created.
    #[error("failed to create shared memory region {name}: {source}")]
    Create {
        /// Region name.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Existing region could not be opened for attach.
    #[error("shared memory region {name} not found: {source}")]
    Attach {
        /// Region name.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A region exists with an unexpected size.
    #[error("shared memory region {name} has size {found}, expected {expected}")]
    SizeMismatch {
        /// Region name.
        name: String,
        /// Expected size in bytes.
        expected: usize,
        /// Size actually found.
        found: usize,
    },

    /// Generic I/O failure not covered above.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for shared-memory operations.
pub type ShmResult<T> = Result<T, ShmError>;
