//! Live HTTP messages exchanged with the transport.
//!
//! These are the in-process counterparts of the stored records: owned,
//! cheaply clonable values whose bodies are raw bytes. Header names are
//! case-insensitive through [`http::HeaderMap`].

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use std::collections::BTreeMap;

/// An outgoing HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Request method.
    pub method: Method,
    /// Absolute request URL.
    pub url: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Raw request body.
    pub body: Bytes,
    /// Additional simple request properties (credentials, mode, cache, ...).
    ///
    /// Keys starting with `_` are private and never serialized.
    pub options: BTreeMap<String, String>,
}

impl HttpRequest {
    /// Creates a request with no headers and an empty body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            options: BTreeMap::new(),
        }
    }

    /// Creates a `GET` request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Creates a `POST` request.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Creates a `PUT` request.
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    /// Creates a `DELETE` request.
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Adds a header, replacing any previous value.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the `content-type` header.
    pub fn with_content_type(self, content_type: &'static str) -> Self {
        self.with_header(CONTENT_TYPE, HeaderValue::from_static(content_type))
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a request property such as `credentials`.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Returns a header value if present and valid visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the `content-type` header.
    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    /// Returns true for `GET` and `HEAD` requests.
    pub fn is_read_only(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }
}

/// How a response body should be reported to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseType {
    /// Ordinary response.
    #[default]
    Basic,
    /// Response rebuilt from a binary buffer.
    Binary,
}

/// An HTTP response returned by the transport.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code.
    pub status: StatusCode,
    /// Reason phrase.
    pub status_text: String,
    /// URL the response was served from.
    pub url: String,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw response body.
    pub body: Bytes,
    /// Response body type.
    pub response_type: ResponseType,
}

impl HttpResponse {
    /// Creates a response with the canonical reason phrase and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            url: String::new(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            response_type: ResponseType::Basic,
        }
    }

    /// Creates a `200 OK` response.
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    /// Sets the reason phrase.
    pub fn with_status_text(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = status_text.into();
        self
    }

    /// Sets the response URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Adds a header, replacing any previous value.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the `content-type` header.
    pub fn with_content_type(self, content_type: &'static str) -> Self {
        self.with_header(CONTENT_TYPE, HeaderValue::from_static(content_type))
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns a header value if present and valid visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the `content-type` header.
    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    /// Returns true when the status is 400 or above.
    pub fn is_error(&self) -> bool {
        self.status.as_u16() >= 400
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_methods() {
        assert!(HttpRequest::get("https://a.test/x").is_read_only());
        assert!(HttpRequest::new(Method::HEAD, "https://a.test/x").is_read_only());
        assert!(!HttpRequest::post("https://a.test/x").is_read_only());
        assert!(!HttpRequest::delete("https://a.test/x").is_read_only());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let request = HttpRequest::post("https://a.test/x").with_content_type("application/json");
        assert_eq!(request.header("Content-Type"), Some("application/json"));
        assert_eq!(request.content_type(), Some("application/json"));
    }

    #[test]
    fn response_defaults() {
        let response = HttpResponse::new(StatusCode::NOT_FOUND);
        assert_eq!(response.status_text, "Not Found");
        assert!(response.is_error());
        assert!(!HttpResponse::ok().is_error());
        assert_eq!(HttpResponse::ok().response_type, ResponseType::Basic);
    }
}
