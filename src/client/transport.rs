//! HTTP transport seam
//!
//! [`ApiClient`](super::ApiClient) owns the retry and quota policy; the
//! transport only performs one GET and reports the status and body. Tests
//! plug in a scripted transport here.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::warn;

/// Status and body of one HTTP response
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: String,
}

impl RawResponse {
    /// Build a response
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Failure before any HTTP status was received
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Request timed out
    #[error("request timed out: {0}")]
    Timeout(String),
    /// Connection could not be established
    #[error("connection failed: {0}")]
    Connect(String),
    /// Any other transport failure
    #[error("request failed: {0}")]
    Other(String),
}

/// One HTTP GET
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a GET to `url` with the given query parameters
    async fn get(&self, url: &str, query: &[(String, String)]) -> Result<RawResponse, TransportError>;
}

/// Production transport on a shared reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build the client with connect and request timeouts
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .user_agent(concat!("footy-ingest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, query: &[(String, String)]) -> Result<RawResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                // Status was received, so the request still counts; an empty
                // body fails JSON parsing and is retried upstream.
                warn!(status = status, error = %e, "Failed to read response body");
                String::new()
            }
        };

        Ok(RawResponse { status, body })
    }
}

fn classify(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(error.to_string())
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else {
        TransportError::Other(error.to_string())
    }
}
