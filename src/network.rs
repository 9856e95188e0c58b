//! Network access for the interceptor
//!
//! The interceptor never talks to reqwest directly; it goes through the
//! `Network` trait so the fallback chains can be driven by a real HTTP client,
//! by an always-offline stand-in, or by a scripted network in tests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use crate::request::{Request, Response};

/// Errors that make the network unavailable for a request
///
/// An HTTP error status is not a network error: a 404 or 500 is still a
/// response and is returned as such.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The request could not reach the server
    #[error("network unreachable for {url}: {reason}")]
    Unreachable { url: String, reason: String },

    /// The request did not complete within the configured timeout
    #[error("request to {0} timed out")]
    Timeout(String),

    /// Network access is switched off
    #[error("offline")]
    Offline,

    /// The response body could not be read
    #[error("failed to read response body from {url}: {reason}")]
    Body { url: String, reason: String },

    /// The HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

/// Something that can perform a request
#[async_trait]
pub trait Network: Send + Sync {
    /// Performs the request, returning the full response on success
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}

/// Default per-request timeout for `HttpNetwork`
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Network backed by a reqwest HTTP client
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    /// Create a new HttpNetwork with the given request timeout
    pub fn new(timeout: Duration) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(NetworkError::Build)?;
        Ok(Self { client })
    }

    /// Create a new HttpNetwork with a custom HTTP client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let url = request.url.to_string();

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                NetworkError::Timeout(url.clone())
            } else {
                NetworkError::Unreachable {
                    url: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        let body = response.bytes().await.map_err(|e| NetworkError::Body {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        Ok(Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
            url: final_url,
        })
    }
}

/// Network that is always unreachable
///
/// Used by `shellcache fetch --offline` to exercise the cache fallbacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineNetwork;

#[async_trait]
impl Network for OfflineNetwork {
    async fn fetch(&self, _request: &Request) -> Result<Response, NetworkError> {
        Err(NetworkError::Offline)
    }
}
