//! Cloud connectivity: identity-token auth, the backend key-value client,
//! the speed-limit fetcher (C5), and the telemetry publisher (C11).

pub mod auth;
pub mod backend;
pub mod speed_limit;
pub mod telemetry;

pub use auth::AuthClient;
pub use backend::{BackendClient, MpuTelemetry, RideStatus};
pub use speed_limit::SpeedLimitFetcher;
pub use telemetry::TelemetryPublisher;
