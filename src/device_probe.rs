//! DeviceProbe - stateless HTTP client operations against a single device
//!
//! ## Responsibilities
//!
//! - Health/version check against the device build-time endpoint
//! - Session-token login
//! - Envelope handling: the device wraps every reply in `{code, msg, result}`
//!   and a non-zero `code` means the device is treated as unreachable, not
//!   as "reachable but degraded"
//!
//! `DeviceProber` is a trait so tests and callers can substitute a fake
//! prober without a live network. `HttpDeviceProbe` shares one pooled
//! `reqwest::Client`; it is safe to call from any number of workers.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Health-check timeout
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// Login timeout
pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Request header carrying the session token on authorized calls
pub const SESSION_TOKEN_HEADER: &str = "X-Session-Token";

/// Ephemeral login token, scoped to one device + credential pair.
/// In-memory only; never persisted.
#[derive(Debug, Clone)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Device API envelope
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    #[serde(default)]
    pub msg: String,
    pub result: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Unwrap the payload, mapping a non-zero application code to a
    /// protocol error.
    pub fn into_result(self) -> Result<T> {
        if self.code != 0 {
            return Err(Error::Protocol(format!(
                "device code {}: {}",
                self.code, self.msg
            )));
        }
        self.result
            .ok_or_else(|| Error::Protocol("missing result payload".to_string()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTimeResult {
    pub build_time: String,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResult {
    token: String,
}

/// Probe operations against a single device
#[async_trait]
pub trait DeviceProber: Send + Sync {
    /// Health/version check. Returns the device build time on success.
    async fn test_device(&self, ip: &str) -> Result<String>;

    /// Credential login. Returns a session token for subsequent calls.
    async fn login(&self, ip: &str, username: &str, password: &str) -> Result<SessionToken>;
}

/// HTTP prober over the device control API
pub struct HttpDeviceProbe {
    client: reqwest::Client,
    port: u16,
}

impl HttpDeviceProbe {
    pub fn new(port: u16) -> Self {
        Self {
            client: reqwest::Client::new(),
            port,
        }
    }

    /// Share an existing pooled client (all batches reuse one pool).
    pub fn with_client(client: reqwest::Client, port: u16) -> Self {
        Self { client, port }
    }

    fn url(&self, ip: &str, path: &str) -> String {
        format!("http://{}:{}{}", ip, self.port, path)
    }
}

#[async_trait]
impl DeviceProber for HttpDeviceProbe {
    async fn test_device(&self, ip: &str) -> Result<String> {
        let response = self
            .client
            .get(self.url(ip, "/api/buildTime"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::Network(format!("{}: {}", ip, e)))?;

        let envelope: ApiResponse<BuildTimeResult> = response
            .json()
            .await
            .map_err(|e| Error::Protocol(format!("{}: bad buildTime body: {}", ip, e)))?;

        Ok(envelope.into_result()?.build_time)
    }

    async fn login(&self, ip: &str, username: &str, password: &str) -> Result<SessionToken> {
        let response = self
            .client
            .post(self.url(ip, "/api/login"))
            .timeout(LOGIN_TIMEOUT)
            .json(&LoginRequest { username, password })
            .send()
            .await
            .map_err(|e| Error::Login(format!("{}: {}", ip, e)))?;

        let envelope: ApiResponse<LoginResult> = response
            .json()
            .await
            .map_err(|e| Error::Login(format!("{}: bad login body: {}", ip, e)))?;

        let token = envelope
            .into_result()
            .map_err(|e| Error::Login(format!("{}: {}", ip, e)))?
            .token;

        // A zero-code response with an empty token is still a failed login.
        if token.is_empty() {
            return Err(Error::Login(format!("{}: empty token", ip)));
        }

        Ok(SessionToken(token))
    }
}
