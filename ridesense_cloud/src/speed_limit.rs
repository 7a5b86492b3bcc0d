//! Speed-Limit Fetcher (C5, §4.9).

use ridesense_common::error::CloudError;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct SpeedLimitsResponse {
    #[serde(default)]
    speed_limits: Vec<SpeedLimitEntry>,
}

#[derive(Debug, Deserialize)]
struct SpeedLimitEntry {
    #[serde(rename = "speedLimit")]
    speed_limit: f64,
}

/// Fetches the posted speed limit for a `(lat, lon)`, throttled to one call
/// per device per `throttle` (default 50 s). Failures and throttled calls
/// retain the previous value (§7).
pub struct SpeedLimitFetcher {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    throttle: Duration,
    last_call: Mutex<Option<Instant>>,
    last_value: Mutex<f64>,
}

impl SpeedLimitFetcher {
    pub fn new(base_url: String, api_key: String, throttle: Duration, initial: f64) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            base_url,
            api_key,
            throttle,
            last_call: Mutex::new(None),
            last_value: Mutex::new(initial),
        }
    }

    /// Returns the current speed limit, querying the backend only if the
    /// throttle window has elapsed; otherwise (or on failure) returns the
    /// last known value.
    pub fn fetch(&self, lat: f64, lon: f64) -> f64 {
        {
            let mut last_call = self.last_call.lock().expect("speed-limit lock poisoned");
            let now = Instant::now();
            if let Some(prev) = *last_call {
                if now.duration_since(prev) < self.throttle {
                    return *self.last_value.lock().expect("speed-limit lock poisoned");
                }
            }
            *last_call = Some(now);
        }

        match self.query(lat, lon) {
            Ok(Some(limit)) => {
                *self.last_value.lock().expect("speed-limit lock poisoned") = limit;
                limit
            }
            Ok(None) => {
                warn!("speed-limit endpoint returned no entries, keeping previous value");
                *self.last_value.lock().expect("speed-limit lock poisoned")
            }
            Err(e) => {
                warn!(error = %e, "speed-limit fetch failed, keeping previous value");
                *self.last_value.lock().expect("speed-limit lock poisoned")
            }
        }
    }

    fn query(&self, lat: f64, lon: f64) -> Result<Option<f64>, CloudError> {
        let points = format!("{lat},{lon}|{lat},{lon}");
        let resp = self
            .http
            .get(&self.base_url)
            .timeout(FETCH_TIMEOUT)
            .query(&[("points", points.as_str()), ("api_key", self.api_key.as_str())])
            .send()
            .map_err(|source| CloudError::Transport {
                url: self.base_url.clone(),
                source,
            })?;

        if !resp.status().is_success() {
            return Err(CloudError::Status {
                url: self.base_url.clone(),
                status: resp.status().as_u16(),
            });
        }

        let body: SpeedLimitsResponse = resp.json().map_err(|source| CloudError::Decode {
            url: self.base_url.clone(),
            source,
        })?;
        Ok(body.speed_limits.first().map(|e| e.speed_limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttled_call_returns_previous_value_without_request() {
        let fetcher = SpeedLimitFetcher::new(
            "http://127.0.0.1:1".to_string(),
            "key".to_string(),
            Duration::from_secs(50),
            40.0,
        );
        assert_eq!(fetcher.fetch(1.0, 2.0), 40.0);
        assert_eq!(fetcher.fetch(1.0, 2.0), 40.0);
    }
}
