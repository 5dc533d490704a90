//! HTTP transport for the two EDStS endpoints
//!
//! The relay talks to the service through [`JournalTransport`] so the
//! submission guards and retry policy can be exercised without a network.

use crate::config::{defaults, ApiConfig};
use async_trait::async_trait;
use serde_json::Value;

/// Transport errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("failed to read response body: {0}")]
    Body(String),
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else if e.is_body() || e.is_decode() {
            Self::Body(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// Status and raw body of one HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// The two requests the relay makes.
#[async_trait]
pub trait JournalTransport: Send + Sync {
    /// `GET {base}/api/auth/verify?key={key}`
    async fn verify_key(&self, api_key: &str) -> Result<HttpReply, TransportError>;

    /// `POST {base}/api/journal/event` with `x-api-key` / `x-permissions` headers
    async fn post_event(
        &self,
        api_key: &str,
        permissions: &str,
        body: &Value,
    ) -> Result<HttpReply, TransportError>;
}

/// reqwest-backed transport
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    verify_timeout: std::time::Duration,
    submit_timeout: std::time::Duration,
}

impl HttpTransport {
    pub fn new(api: &ApiConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("edsts-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self {
            http,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            verify_timeout: api.verify_timeout(),
            submit_timeout: api.submit_timeout(),
        })
    }

    /// Get base URL for logging
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn reply(resp: reqwest::Response) -> Result<HttpReply, TransportError> {
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(HttpReply { status, body })
    }
}

#[async_trait]
impl JournalTransport for HttpTransport {
    async fn verify_key(&self, api_key: &str) -> Result<HttpReply, TransportError> {
        let resp = self
            .http
            .get(format!("{}{}", self.base_url, defaults::VERIFY_PATH))
            .query(&[("key", api_key)])
            .timeout(self.verify_timeout)
            .send()
            .await?;
        Self::reply(resp).await
    }

    async fn post_event(
        &self,
        api_key: &str,
        permissions: &str,
        body: &Value,
    ) -> Result<HttpReply, TransportError> {
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, defaults::JOURNAL_PATH))
            .header("Content-Type", "application/json")
            .header("x-api-key", api_key)
            .header("x-permissions", permissions)
            .json(body)
            .timeout(self.submit_timeout)
            .send()
            .await?;
        Self::reply(resp).await
    }
}
