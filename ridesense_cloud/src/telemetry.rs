//! Cloud Telemetry Publisher (C11, §4.8).

use crate::auth::AuthClient;
use crate::backend::{BackendClient, MpuTelemetry};
use tracing::warn;

/// Pushes the latest speed, speed limit, and IMU reading to the backend at
/// a fixed cadence. Owns no thread itself — the caller drives `publish` at
/// its chosen cadence (default 7 s, §4.4).
pub struct TelemetryPublisher {
    backend: BackendClient,
    auth: AuthClient,
    user_id: String,
}

impl TelemetryPublisher {
    pub fn new(backend: BackendClient, auth: AuthClient, user_id: String) -> Self {
        Self {
            backend,
            auth,
            user_id,
        }
    }

    /// One telemetry push: rider-data (speed/limit/warnings) then the mpu
    /// sub-object. A failure on either step is logged and does not retry
    /// until the next cadence (§7 "Authentication").
    pub fn publish(&self, speed: f64, speed_limit: f64, mpu: MpuTelemetry, t_ms: u64) {
        let token = match self.auth.current_token() {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "skipping telemetry push, no valid token");
                return;
            }
        };

        if let Err(e) = self
            .backend
            .patch_rider_data(&self.user_id, speed, speed_limit, t_ms, &token)
        {
            warn!(error = %e, "rider_data telemetry push failed");
        }

        if let Err(e) = self.backend.patch_mpu(&self.user_id, mpu, t_ms, &token) {
            warn!(error = %e, "mpu telemetry push failed");
        }
    }

    pub fn auth(&self) -> &AuthClient {
        &self.auth
    }

    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

