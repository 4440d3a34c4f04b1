//! Transport layer abstraction for replaying requests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use synclog_codec::{HttpRequest, HttpResponse, StatusCode};
use thiserror::Error;

/// Result type for transport calls.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors raised by a transport before any HTTP response is available.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection could not be established or was lost.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The request timed out.
    #[error("request timed out")]
    Timeout,

    /// The request could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// A `fetch`-shaped transport: sends one request, yields one response.
///
/// HTTP error statuses are returned as responses, not errors.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and waits for its response.
    async fn fetch(&self, request: HttpRequest) -> TransportResult<HttpResponse>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn fetch(&self, request: HttpRequest) -> TransportResult<HttpResponse> {
        (**self).fetch(request).await
    }
}

/// Chooses between a platform transport and an injected one at call time.
///
/// The platform transport wins when it is present; otherwise requests go
/// through the injected transport.
#[derive(Clone)]
pub struct TransportSelector {
    platform: Option<Arc<dyn Transport>>,
    injected: Arc<dyn Transport>,
}

impl TransportSelector {
    /// Creates a selector with only an injected transport.
    pub fn new(injected: Arc<dyn Transport>) -> Self {
        Self {
            platform: None,
            injected,
        }
    }

    /// Sets the platform transport.
    pub fn with_platform(mut self, platform: Arc<dyn Transport>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Returns true if the platform transport is present.
    pub fn has_platform(&self) -> bool {
        self.platform.is_some()
    }

    /// Returns the transport the next request will use.
    pub fn select(&self) -> &Arc<dyn Transport> {
        self.platform.as_ref().unwrap_or(&self.injected)
    }
}

impl std::fmt::Debug for TransportSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSelector")
            .field("has_platform", &self.has_platform())
            .finish()
    }
}

#[async_trait]
impl Transport for TransportSelector {
    async fn fetch(&self, request: HttpRequest) -> TransportResult<HttpResponse> {
        self.select().fetch(request).await
    }
}

/// A mock transport for testing.
///
/// Records every request and answers `200 OK` unless a status or error has
/// been scripted for the request URL.
#[derive(Debug, Default)]
pub struct MockTransport {
    calls: Mutex<Vec<HttpRequest>>,
    statuses: Mutex<HashMap<String, StatusCode>>,
    failures: Mutex<HashMap<String, TransportError>>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers requests to `url` with `status`.
    pub fn respond_with(&self, url: impl Into<String>, status: StatusCode) {
        self.statuses.lock().insert(url.into(), status);
    }

    /// Fails requests to `url` with `error`.
    pub fn fail_with(&self, url: impl Into<String>, error: TransportError) {
        self.failures.lock().insert(url.into(), error);
    }

    /// Removes all scripted statuses and errors.
    pub fn reset(&self) {
        self.statuses.lock().clear();
        self.failures.lock().clear();
    }

    /// Returns every request received so far.
    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().clone()
    }

    /// Returns `"METHOD url"` for every request received so far.
    pub fn call_log(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .map(|r| format!("{} {}", r.method, r.url))
            .collect()
    }

    /// Returns the number of requests received.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, request: HttpRequest) -> TransportResult<HttpResponse> {
        let url = request.url.clone();
        self.calls.lock().push(request);

        if let Some(error) = self.failures.lock().get(&url) {
            return Err(error.clone());
        }
        let status = self
            .statuses
            .lock()
            .get(&url)
            .copied()
            .unwrap_or(StatusCode::OK);
        Ok(HttpResponse::new(status).with_url(url))
    }
}
