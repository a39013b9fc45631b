//! HTTP transport implementation.
//!
//! The sync contract is HTTP+JSON with fixed paths:
//!
//! - `GET  {base}/api/sync/changes?since={lastSyncId}`
//! - `POST {base}/api/sync/push`
//!
//! The actual HTTP client is abstracted via [`HttpClient`], so the
//! authenticated client supplied by the credential layer plugs in without
//! the engine seeing headers or tokens. A reqwest-backed client is available
//! behind the `reqwest-client` feature; [`LoopbackClient`] routes requests
//! to an in-process server for tests.

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use async_trait::async_trait;
use carnet_sync_protocol::{ChangesResponse, PushRequest, PushResponse};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// A raw HTTP response: status code plus body bytes.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// Creates a 200 response with a JSON body.
    pub fn ok(body: Vec<u8>) -> Self {
        Self::new(200, body)
    }
}

/// Transport-level failures below the HTTP status line.
///
/// All variants are transient by nature (the request may never have reached
/// the server) and map to retryable sync errors.
#[derive(Error, Debug)]
pub enum HttpError {
    /// Could not establish a connection.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The request timed out.
    #[error("request timed out")]
    Timeout,

    /// The connection failed mid-request.
    #[error("i/o failure: {0}")]
    Io(String),
}

/// HTTP client abstraction.
///
/// Implementations own connection management and authentication headers.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a GET request.
    async fn get(&self, url: &str) -> Result<HttpResponse, HttpError>;

    /// Sends a POST request with a JSON body.
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, HttpError>;
}

/// HTTP-based sync transport speaking the JSON wire contract.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport against `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url, client }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn decode<T: DeserializeOwned>(response: HttpResponse) -> SyncResult<T> {
        let body = check_status(response)?;
        serde_json::from_slice(&body)
            .map_err(|e| SyncError::Protocol(format!("failed to decode response: {e}")))
    }
}

/// Maps an HTTP status to the sync error taxonomy.
///
/// 2xx passes the body through. 408/429 and 5xx are transient (retryable
/// transport errors); any other 4xx is a server rejection and is not retried
/// automatically.
fn check_status(response: HttpResponse) -> SyncResult<Vec<u8>> {
    match response.status {
        200..=299 => Ok(response.body),
        408 | 429 | 500..=599 => Err(SyncError::transport_retryable(format!(
            "server returned {}",
            response.status
        ))),
        status => Err(SyncError::ServerRejection(format!(
            "{}: {}",
            status,
            String::from_utf8_lossy(&response.body)
        ))),
    }
}

#[async_trait]
impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    async fn fetch_changes(&self, since: u64) -> SyncResult<ChangesResponse> {
        let url = format!("{}/api/sync/changes?since={}", self.base_url, since);
        let response = self
            .client
            .get(&url)
            .await
            .map_err(|e| SyncError::transport_retryable(e.to_string()))?;
        Self::decode(response)
    }

    async fn push_changes(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        let url = format!("{}/api/sync/push", self.base_url);
        let body = serde_json::to_vec(request)
            .map_err(|e| SyncError::Protocol(format!("failed to encode request: {e}")))?;
        let response = self
            .client
            .post(&url, body)
            .await
            .map_err(|e| SyncError::transport_retryable(e.to_string()))?;
        Self::decode(response)
    }
}

/// An in-process server that can answer loopback requests.
pub trait LoopbackServer: Send + Sync {
    /// Handles one request. `path_and_query` starts at `/api/`.
    fn handle(&self, method: &str, path_and_query: &str, body: &[u8]) -> HttpResponse;
}

/// An HTTP client that routes requests directly to a [`LoopbackServer`].
///
/// Useful for testing without network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

#[async_trait]
impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    async fn get(&self, url: &str) -> Result<HttpResponse, HttpError> {
        let path = url.find("/api/").map(|i| &url[i..]).unwrap_or(url);
        Ok(self.server.handle("GET", path, &[]))
    }

    async fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, HttpError> {
        let path = url.find("/api/").map(|i| &url[i..]).unwrap_or(url);
        Ok(self.server.handle("POST", path, &body))
    }
}

/// reqwest-backed HTTP client.
#[cfg(feature = "reqwest-client")]
pub struct ReqwestClient {
    inner: reqwest::Client,
}

#[cfg(feature = "reqwest-client")]
impl ReqwestClient {
    /// Wraps a preconfigured client (auth middleware, timeouts).
    pub fn new(inner: reqwest::Client) -> Self {
        Self { inner }
    }

    fn map_error(e: reqwest::Error) -> HttpError {
        if e.is_timeout() {
            HttpError::Timeout
        } else if e.is_connect() {
            HttpError::Connect(e.to_string())
        } else {
            HttpError::Io(e.to_string())
        }
    }

    async fn read(response: reqwest::Response) -> Result<HttpResponse, HttpError> {
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(Self::map_error)?;
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

#[cfg(feature = "reqwest-client")]
#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, HttpError> {
        let response = self.inner.get(url).send().await.map_err(Self::map_error)?;
        Self::read(response).await
    }

    async fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, HttpError> {
        let response = self
            .inner
            .post(url)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(Self::map_error)?;
        Self::read(response).await
    }
}
