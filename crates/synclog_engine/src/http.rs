//! HTTP transport implementation.
//!
//! Sends replayed requests over the network with `reqwest`.

use crate::transport::{Transport, TransportError, TransportResult};
use async_trait::async_trait;
use std::time::Duration;
use synclog_codec::{HttpRequest, HttpResponse};
use tracing::debug;

/// Production transport backed by a `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with a default client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn with_timeout(timeout: Duration) -> TransportResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn map_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_builder() {
        TransportError::InvalidRequest(err.to_string())
    } else {
        TransportError::Connection(err.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn fetch(&self, request: HttpRequest) -> TransportResult<HttpResponse> {
        debug!(method = %request.method, url = %request.url, "Sending request");
        let response = self
            .client
            .request(request.method, request.url.as_str())
            .headers(request.headers)
            .body(request.body)
            .send()
            .await
            .map_err(map_error)?;

        let status = response.status();
        let url = response.url().to_string();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(map_error)?;

        let mut rebuilt = HttpResponse::new(status).with_url(url).with_body(body);
        rebuilt.headers = headers;
        Ok(rebuilt)
    }
}
