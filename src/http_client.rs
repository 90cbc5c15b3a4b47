//! HTTP client adapter: performs requests, maps wire results to typed
//! outcomes, and owns the OAuth client-credentials token.

use crate::errors::InitError;
use base64::Engine;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

const API_BASE: &str = "https://api.spotify.com/v1";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Credentials loaded once at startup from the local JSON document.
#[derive(Debug, serde::Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn load(path: &str) -> Result<Self, InitError> {
        let raw = std::fs::read_to_string(path).map_err(|source| InitError::CredentialsIo {
            path: path.to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| InitError::CredentialsParse {
            path: path.to_string(),
            source,
        })
    }
}

/// The decoded outcome of a single fetch attempt.
pub enum FetchOutcome {
    /// 200 OK with the decoded JSON body and measured call time.
    Success { data: Value, call_time: Duration },
    /// Transport-level failure, including timeout.
    Transport,
    /// 429, with any `Retry-After` hint copied out as a float.
    RateLimited { retry_after: Option<f64> },
    /// 401: token expired, caller should refresh and retry.
    TokenExpired,
    /// 403: bad OAuth, permanent — caller should drop the endpoint.
    Forbidden,
}

/// Thin wrapper over `reqwest::Client` carrying the current bearer token and
/// performing the client-credentials refresh flow.
pub struct HttpClientAdapter {
    http: reqwest::Client,
    token: RwLock<String>,
    client_id: String,
    client_secret: String,
}

impl HttpClientAdapter {
    pub fn new(credentials: Credentials) -> Result<Self, InitError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(InitError::HttpClientBuild)?;
        Ok(Self {
            http,
            token: RwLock::new(String::new()),
            client_id: credentials.client_id,
            client_secret: credentials.client_secret,
        })
    }

    /// Perform the client-credentials exchange and store the resulting
    /// bearer token. Called once at startup and again on every 401.
    pub async fn refresh_token(&self) -> Result<(), InitError> {
        let auth = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.client_id, self.client_secret));

        let resp = self
            .http
            .post(TOKEN_URL)
            .header("Authorization", format!("Basic {auth}"))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
            .send()
            .await
            .map_err(|e| InitError::TokenExchange(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(InitError::TokenExchange(format!(
                "status {}",
                resp.status()
            )));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| InitError::TokenExchange(e.to_string()))?;
        let token = body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| InitError::TokenExchange("missing access_token".to_string()))?;

        *self.token.write() = token.to_string();
        Ok(())
    }

    /// Issue one request to `path` (relative to the API base) with `params`.
    /// Never propagates an error: every outcome, including transport
    /// failure, is represented as a [`FetchOutcome`] variant.
    pub async fn fetch(&self, path: &str, params: &BTreeMap<String, String>) -> FetchOutcome {
        let url = format!("{API_BASE}{path}");
        let token = self.token.read().clone();
        let start = Instant::now();

        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(params)
            .send()
            .await;

        let resp = match resp {
            Ok(resp) => resp,
            Err(_) => return FetchOutcome::Transport,
        };

        let status = resp.status();
        let call_time = start.elapsed();

        if status.as_u16() == 429 {
            let retry_after = resp
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<f64>().ok());
            return FetchOutcome::RateLimited { retry_after };
        }
        if status.as_u16() == 401 {
            return FetchOutcome::TokenExpired;
        }
        if status.as_u16() == 403 {
            return FetchOutcome::Forbidden;
        }

        let is_json = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false);

        let data = if is_json {
            resp.json().await.unwrap_or_else(|_| Value::Object(Default::default()))
        } else {
            Value::Object(Default::default())
        };

        FetchOutcome::Success { data, call_time }
    }
}
