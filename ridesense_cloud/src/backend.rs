//! Backend key-value store client (§6 "Backend key-value store").

use ridesense_common::error::CloudError;
use serde::Deserialize;
use std::time::Duration;

const PATCH_TIMEOUT: Duration = Duration::from_secs(5);
const GET_TIMEOUT: Duration = Duration::from_secs(5);
const PUT_TIMEOUT: Duration = Duration::from_secs(30);

/// One IMU reading as pushed to `rider_data/mpu`.
#[derive(Debug, Clone, Copy)]
pub struct MpuTelemetry {
    pub acc_x: f64,
    pub acc_y: f64,
    pub acc_z: f64,
    pub gyro_x: f64,
    pub gyro_y: f64,
    pub gyro_z: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RideStatus {
    pub is_active: bool,
    #[serde(default)]
    pub calculate_model: bool,
}

/// Thin client over the hierarchical backend paths (§6). All calls require
/// a caller-supplied identity token (see [`crate::auth::AuthClient`]).
pub struct BackendClient {
    http: reqwest::blocking::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: String) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            base_url,
        }
    }

    fn url(&self, path: &str, token: &str) -> String {
        format!("{}{path}.json?auth={token}", self.base_url)
    }

    /// PATCH `/users/{uid}/rider_data` with speed/speed-limit and, only when
    /// `speed > speed_limit`, a single timestamped warning entry (§4.8 #1).
    pub fn patch_rider_data(
        &self,
        user_id: &str,
        speed: f64,
        speed_limit: f64,
        t_ms: u64,
        token: &str,
    ) -> Result<(), CloudError> {
        let active_warnings = if speed > speed_limit {
            serde_json::json!({
                format!("warning_{t_ms}"): {
                    "type": "speed_limit",
                    "message": "Speed Limit Exceeded!",
                    "timestamp": t_ms,
                }
            })
        } else {
            serde_json::json!({})
        };

        let url = self.url(&format!("/users/{user_id}/rider_data"), token);
        self.patch(
            &url,
            &serde_json::json!({
                "speed": speed,
                "speed_limit": speed_limit,
                "active_warnings": active_warnings,
            }),
        )
    }

    /// PATCH `/users/{uid}/rider_data/mpu` (§4.8 #2).
    pub fn patch_mpu(
        &self,
        user_id: &str,
        mpu: MpuTelemetry,
        t_ms: u64,
        token: &str,
    ) -> Result<(), CloudError> {
        let url = self.url(&format!("/users/{user_id}/rider_data/mpu"), token);
        self.patch(
            &url,
            &serde_json::json!({
                "acc_x": mpu.acc_x,
                "acc_y": mpu.acc_y,
                "acc_z": mpu.acc_z,
                "gyro_x": mpu.gyro_x,
                "gyro_y": mpu.gyro_y,
                "gyro_z": mpu.gyro_z,
                "timestamp": t_ms,
            }),
        )
    }

    /// GET `/users/{uid}/next_ride_id`, which returns an integer-string.
    pub fn get_next_ride_id(&self, user_id: &str, token: &str) -> Result<u64, CloudError> {
        let url = self.url(&format!("/users/{user_id}/next_ride_id"), token);
        let resp = self
            .http
            .get(&url)
            .timeout(GET_TIMEOUT)
            .send()
            .map_err(|source| CloudError::Transport {
                url: url.clone(),
                source,
            })?;
        if !resp.status().is_success() {
            return Err(CloudError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }
        let text = resp
            .text()
            .map_err(|source| CloudError::Decode { url: url.clone(), source })?;
        text.trim().trim_matches('"').parse().map_err(|_| CloudError::AuthFailed(
            format!("next_ride_id response {text:?} is not an integer"),
        ))
    }

    /// PATCH `/users/{uid}/rides/{rid}/ride_control/ride_status` to set
    /// `is_active` and `start_timestamp`.
    pub fn patch_ride_status(
        &self,
        user_id: &str,
        ride_id: &str,
        is_active: bool,
        start_timestamp_ms: u64,
        token: &str,
    ) -> Result<(), CloudError> {
        let url = self.url(
            &format!("/users/{user_id}/rides/{ride_id}/ride_control/ride_status"),
            token,
        );
        self.patch(
            &url,
            &serde_json::json!({
                "is_active": is_active,
                "start_timestamp": start_timestamp_ms,
            }),
        )
    }

    /// GET the same path, returning `{is_active, calculate_model}`.
    pub fn get_ride_status(
        &self,
        user_id: &str,
        ride_id: &str,
        token: &str,
    ) -> Result<RideStatus, CloudError> {
        let url = self.url(
            &format!("/users/{user_id}/rides/{ride_id}/ride_control/ride_status"),
            token,
        );
        let resp = self
            .http
            .get(&url)
            .timeout(GET_TIMEOUT)
            .send()
            .map_err(|source| CloudError::Transport {
                url: url.clone(),
                source,
            })?;
        if !resp.status().is_success() {
            return Err(CloudError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }
        resp.json()
            .map_err(|source| CloudError::Decode { url, source })
    }

    /// PUT the finished ride's CSV rows as a JSON array to
    /// `/users/{uid}/rides/{rid}/raw_data`. This is `upload_raw_data_to_firebase`.
    pub fn upload_raw_data(
        &self,
        user_id: &str,
        ride_id: &str,
        rows: &[serde_json::Value],
        token: &str,
    ) -> Result<(), CloudError> {
        let url = self.url(&format!("/users/{user_id}/rides/{ride_id}/raw_data"), token);
        let resp = self
            .http
            .put(&url)
            .timeout(PUT_TIMEOUT)
            .json(rows)
            .send()
            .map_err(|source| CloudError::Transport {
                url: url.clone(),
                source,
            })?;
        if !resp.status().is_success() {
            return Err(CloudError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }

    fn patch(&self, url: &str, body: &serde_json::Value) -> Result<(), CloudError> {
        let resp = self
            .http
            .patch(url)
            .timeout(PATCH_TIMEOUT)
            .json(body)
            .send()
            .map_err(|source| CloudError::Transport {
                url: url.to_string(),
                source,
            })?;
        if !resp.status().is_success() {
            return Err(CloudError::Status {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }
}
