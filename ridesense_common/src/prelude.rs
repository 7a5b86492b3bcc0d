//! Prelude module for common re-exports.
//!
//! ```rust
//! use ridesense_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, PipelineConfig};

// ─── Errors ─────────────────────────────────────────────────────────
pub use crate::error::CloudError;

// ─── Data model ─────────────────────────────────────────────────────
pub use crate::model::{
    CalibrationBias, LstmLabel, SensorSample, SpeedSource, WarningVector, MAX_SPEED_KMH,
};

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::logging::init_tracing;
