//! Transports for exercising timing-sensitive engine behavior.

use async_trait::async_trait;
use synclog_codec::{HttpRequest, HttpResponse, Method};
use synclog_engine::{MockTransport, Transport, TransportError, TransportResult};
use tokio::sync::{Notify, Semaphore};

/// A transport that holds every request until released.
///
/// Requests are recorded and answered by an inner [`MockTransport`] once a
/// permit is available.
#[derive(Debug)]
pub struct GatedTransport {
    inner: MockTransport,
    gate: Semaphore,
    arrived: Notify,
}

impl GatedTransport {
    /// Creates a closed gate.
    pub fn new() -> Self {
        Self {
            inner: MockTransport::new(),
            gate: Semaphore::new(0),
            arrived: Notify::new(),
        }
    }

    /// Lets `n` held requests through.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Waits until a request reaches the gate.
    pub async fn wait_for_request(&self) {
        self.arrived.notified().await;
    }

    /// Returns the inner transport for scripting and inspection.
    pub fn inner(&self) -> &MockTransport {
        &self.inner
    }
}

impl Default for GatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn fetch(&self, request: HttpRequest) -> TransportResult<HttpResponse> {
        self.arrived.notify_one();
        self.gate
            .acquire()
            .await
            .map_err(|_| TransportError::Connection("gate closed".into()))?
            .forget();
        self.inner.fetch(request).await
    }
}

/// A transport that never answers requests with the given methods.
///
/// Other requests are answered by an inner [`MockTransport`].
#[derive(Debug)]
pub struct SilentTransport {
    inner: MockTransport,
    silent: Vec<Method>,
}

impl SilentTransport {
    /// Never answers `OPTIONS`, so every preflight times out.
    pub fn options_only() -> Self {
        Self {
            inner: MockTransport::new(),
            silent: vec![Method::OPTIONS],
        }
    }

    /// Never answers anything.
    pub fn all() -> Self {
        Self {
            inner: MockTransport::new(),
            silent: Vec::new(),
        }
    }

    fn is_silent(&self, method: &Method) -> bool {
        self.silent.is_empty() || self.silent.contains(method)
    }

    /// Returns the inner transport for scripting and inspection.
    pub fn inner(&self) -> &MockTransport {
        &self.inner
    }
}

#[async_trait]
impl Transport for SilentTransport {
    async fn fetch(&self, request: HttpRequest) -> TransportResult<HttpResponse> {
        if self.is_silent(&request.method) {
            return std::future::pending().await;
        }
        self.inner.fetch(request).await
    }
}
