//! Remote identity service client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use docgate_core::Capability;

use crate::PermissionSet;

const LOGIN_PATH: &str = "/api/oauth2";
const CAPABILITIES_PATH: &str = "/api/accessibilityObjects";
const TOKEN_HEADER: &str = "Oauth-Token";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// 401/403: the token is not (or no longer) accepted.
    #[error("token rejected (status {0})")]
    Rejected(u16),

    #[error("unexpected status {0}: {1}")]
    Status(u16, String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("malformed response body: {0}")]
    Malformed(String),

    #[error("{0}")]
    LoginFailed(String),
}

impl IdentityError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// Exchange credentials for an access token.
    async fn login(&self, username: &str, password: &str) -> Result<String, IdentityError>;

    /// Fetch the capability list granted to `token`.
    async fn fetch_capabilities(&self, token: &str) -> Result<PermissionSet, IdentityError>;
}

#[derive(Debug, Serialize)]
struct PasswordGrant<'a> {
    username: &'a str,
    password: &'a str,
    grant_type: &'static str,
}

/// reqwest-backed [`IdentityClient`].
#[derive(Debug, Clone)]
pub struct HttpIdentityClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpIdentityClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IdentityError::Network(e.to_string()))?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl IdentityClient for HttpIdentityClient {
    async fn login(&self, username: &str, password: &str) -> Result<String, IdentityError> {
        let resp = self
            .http
            .post(self.url(LOGIN_PATH))
            .json(&PasswordGrant {
                username,
                password,
                grant_type: "password",
            })
            .send()
            .await
            .map_err(IdentityError::from_reqwest)?;

        let status = resp.status();
        let text = resp.text().await.map_err(IdentityError::from_reqwest)?;
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

        if !status.is_success() {
            let message = ["message", "error"]
                .iter()
                .find_map(|k| body.get(*k).and_then(Value::as_str))
                .map(str::to_string)
                .unwrap_or_else(|| format!("Login failed: {}", text));
            return Err(IdentityError::LoginFailed(message));
        }

        body.get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or_else(|| IdentityError::LoginFailed("No access token received from server".to_string()))
    }

    async fn fetch_capabilities(&self, token: &str) -> Result<PermissionSet, IdentityError> {
        let resp = self
            .http
            .post(self.url(CAPABILITIES_PATH))
            .header(TOKEN_HEADER, token)
            .send()
            .await
            .map_err(IdentityError::from_reqwest)?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(IdentityError::Rejected(status.as_u16()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(IdentityError::Status(status.as_u16(), body));
        }

        let text = resp.text().await.map_err(IdentityError::from_reqwest)?;
        parse_capability_body(&text)
    }
}

/// Parse a capability response body.
///
/// Accepts `{"accessible_objects": [...]}` or a bare array. Valid JSON of any
/// other shape yields an empty set; text that is not JSON is an error.
pub fn parse_capability_body(text: &str) -> Result<PermissionSet, IdentityError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| IdentityError::Malformed(e.to_string()))?;

    let entries = match &value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("accessible_objects") {
            Some(Value::Array(items)) => items,
            _ => {
                tracing::warn!("capability response has no accessible_objects array; granting nothing");
                return Ok(PermissionSet::empty());
            }
        },
        _ => {
            tracing::warn!("capability response is neither an object nor an array; granting nothing");
            return Ok(PermissionSet::empty());
        }
    };

    let set: PermissionSet = entries
        .iter()
        .filter_map(|v| match v.as_str() {
            Some(s) => Some(Capability::new(s.to_string())),
            None => {
                tracing::debug!(entry = %v, "ignoring non-string capability entry");
                None
            }
        })
        .collect();
    Ok(set)
}
