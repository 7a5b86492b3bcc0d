//! Forward-camera frame cache (§6 `captured_images/frame_{t_ms}.jpg`).
//!
//! The camera itself is an external collaborator; this crate only defines
//! the seam the sampler calls into, best-effort and safe to omit at 100 Hz.

/// Produces (or skips) the on-disk path for a captured frame at `t_ms`.
pub trait CaptureSink: Send {
    fn path_for(&self, t_ms: i64) -> Option<String>;
}

/// Default sink: no camera attached, every row's `image_path` is empty.
pub struct NoCaptureSink;

impl CaptureSink for NoCaptureSink {
    fn path_for(&self, _t_ms: i64) -> Option<String> {
        None
    }
}
