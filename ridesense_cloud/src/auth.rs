//! Identity-token cache and refresh (§4.8 "Authentication").

use ridesense_common::error::CloudError;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const IDENTITY_ENDPOINT: &str = "https://identitytoolkit.googleapis.com/v1/accounts:signInWithPassword";
const SECURETOKEN_ENDPOINT: &str = "https://securetoken.googleapis.com/v1/token";

/// Refresh this long before expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

const AUTH_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Deserialize)]
struct SignInResponse {
    #[serde(rename = "idToken")]
    id_token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: String,
    #[serde(rename = "expiresIn")]
    expires_in: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

struct TokenState {
    id_token: String,
    refresh_token: String,
    expires_at: Instant,
}

/// Caches a Firebase-style identity token, refreshing it before expiry and
/// falling back to a full re-login if the refresh token itself is
/// rejected (§4.8, §7 "Authentication").
pub struct AuthClient {
    http: reqwest::blocking::Client,
    api_key: String,
    email: String,
    password: String,
    state: Mutex<Option<TokenState>>,
}

impl AuthClient {
    pub fn new(api_key: String, email: String, password: String) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            api_key,
            email,
            password,
            state: Mutex::new(None),
        }
    }

    /// Returns a currently-valid identity token, signing in or refreshing
    /// as needed.
    pub fn current_token(&self) -> Result<String, CloudError> {
        let mut guard = self.state.lock().expect("auth state lock poisoned");
        let needs_refresh = match guard.as_ref() {
            None => true,
            Some(s) => Instant::now() + REFRESH_MARGIN >= s.expires_at,
        };

        if needs_refresh {
            let refresh_token = guard.as_ref().map(|s| s.refresh_token.clone());
            let fresh = match refresh_token {
                Some(rt) => match self.refresh(&rt) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(error = %e, "token refresh failed, re-authenticating");
                        self.sign_in()?
                    }
                },
                None => self.sign_in()?,
            };
            *guard = Some(fresh);
        }

        Ok(guard.as_ref().expect("token state set above").id_token.clone())
    }

    fn sign_in(&self) -> Result<TokenState, CloudError> {
        let url = format!("{IDENTITY_ENDPOINT}?key={}", self.api_key);
        let resp = self
            .http
            .post(&url)
            .timeout(AUTH_TIMEOUT)
            .json(&serde_json::json!({
                "email": self.email,
                "password": self.password,
                "returnSecureToken": true,
            }))
            .send()
            .map_err(|source| CloudError::Transport {
                url: url.clone(),
                source,
            })?;

        if !resp.status().is_success() {
            return Err(CloudError::AuthFailed(format!(
                "sign-in returned status {}",
                resp.status()
            )));
        }

        let body: SignInResponse = resp
            .json()
            .map_err(|source| CloudError::Decode { url, source })?;
        info!("signed in to cloud backend");
        Ok(TokenState {
            id_token: body.id_token,
            refresh_token: body.refresh_token,
            expires_at: Instant::now() + expires_in_duration(&body.expires_in),
        })
    }

    fn refresh(&self, refresh_token: &str) -> Result<TokenState, CloudError> {
        let url = format!("{SECURETOKEN_ENDPOINT}?key={}", self.api_key);
        let resp = self
            .http
            .post(&url)
            .timeout(AUTH_TIMEOUT)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .map_err(|source| CloudError::Transport {
                url: url.clone(),
                source,
            })?;

        if !resp.status().is_success() {
            return Err(CloudError::AuthFailed(format!(
                "token refresh returned status {}",
                resp.status()
            )));
        }

        let body: RefreshResponse = resp
            .json()
            .map_err(|source| CloudError::Decode { url, source })?;
        Ok(TokenState {
            id_token: body.id_token,
            refresh_token: body.refresh_token,
            expires_at: Instant::now() + expires_in_duration(&body.expires_in),
        })
    }
}

fn expires_in_duration(expires_in: &str) -> Duration {
    Duration::from_secs(expires_in.parse().unwrap_or(3600))
}
