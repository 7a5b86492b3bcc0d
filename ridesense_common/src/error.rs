//! Crate-wide error taxonomy.
//!
//! Per the error-handling design, most runtime faults (transient I/O,
//! device-absent, calibration failure, model-load failure) are *not*
//! propagated as errors — they're logged and degrade in place. These types
//! cover the faults that genuinely stop an operation: config loading,
//! shared-memory setup, and the cloud RPC surface.

use thiserror::Error;

/// Errors from the cloud RPC surface (C5, C8, C11): authentication,
/// HTTP transport, and response parsing.
#[derive(Debug, Error)]
pub enum CloudError {
    /// The HTTP transport itself failed (DNS, connect, timeout).
    #[error("cloud request to {url} failed: {source}")]
    Transport {
        /// Request URL.
        url: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The backend responded with a non-2xx status.
    #[error("cloud request to {url} returned status {status}")]
    Status {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The response body could not be parsed into the expected shape.
    #[error("failed to parse response from {url}: {source}")]
    Decode {
        /// Request URL.
        url: String,
        /// Underlying decode error.
        #[source]
        source: reqwest::Error,
    },

    /// Sign-in or token refresh failed and no fallback token was available.
    #[error("authentication failed: {0}")]
    AuthFailed(String),
}
