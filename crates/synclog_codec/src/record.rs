//! Storable records and the conversions to and from live messages.

use crate::error::{CodecError, CodecResult};
use crate::headers::{ensure_date_header, headers_to_map, map_to_headers};
use crate::message::{HttpRequest, HttpResponse, ResponseType};
use crate::multipart::{
    encode_multipart, generate_boundary, is_multipart, multipart_content_type, parse_multipart,
    FormField,
};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Captured message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum BodyRecord {
    /// No body was captured.
    Empty,
    /// Decoded text body.
    Text(String),
    /// Binary body, base64 in serialized form.
    Binary(#[serde(with = "crate::base64_serde")] Vec<u8>),
    /// Multipart form fields.
    Multipart(Vec<FormField>),
}

/// A request in storable form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    /// Request method.
    pub method: String,
    /// Request URL.
    pub url: String,
    /// Lower-cased header names to values.
    pub headers: BTreeMap<String, String>,
    /// Captured body.
    pub body: BodyRecord,
    /// Public request properties.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

/// A response in storable form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRecord {
    /// Status code.
    pub status: u16,
    /// Reason phrase.
    pub status_text: String,
    /// Response URL.
    #[serde(default)]
    pub url: String,
    /// Lower-cased header names to values.
    pub headers: BTreeMap<String, String>,
    /// Captured body.
    pub body: BodyRecord,
}

fn is_text_like(content_type: &str) -> bool {
    let lower = content_type.to_ascii_lowercase();
    lower.starts_with("text/") || lower.contains("json")
}

fn capture_body(body: &Bytes, content_type: Option<&str>, is_request: bool) -> CodecResult<BodyRecord> {
    if let Some(ct) = content_type.filter(|ct| is_multipart(ct)) {
        let text = std::str::from_utf8(body)
            .map_err(|_| CodecError::unsupported_payload("multipart body is not valid UTF-8"))?;
        return Ok(BodyRecord::Multipart(parse_multipart(text, ct)?));
    }

    let text_like = content_type.is_some_and(is_text_like);
    if is_request || text_like {
        match std::str::from_utf8(body) {
            Ok(text) => return Ok(BodyRecord::Text(text.to_string())),
            Err(_) if text_like => {
                return Err(CodecError::unsupported_payload(format!(
                    "{} body is not valid UTF-8",
                    content_type.unwrap_or_default()
                )))
            }
            Err(_) => {}
        }
    }

    if body.is_empty() {
        Ok(BodyRecord::Empty)
    } else {
        Ok(BodyRecord::Binary(body.to_vec()))
    }
}

fn public_options(options: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    options
        .iter()
        .filter(|(key, _)| !key.starts_with('_'))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Serializes a request into a storable record.
///
/// The request is borrowed, so it stays usable by the caller.
pub fn request_to_record(request: &HttpRequest) -> CodecResult<RequestRecord> {
    Ok(RequestRecord {
        method: request.method.as_str().to_string(),
        url: request.url.clone(),
        headers: headers_to_map(&request.headers),
        body: capture_body(&request.body, request.content_type(), true)?,
        options: public_options(&request.options),
    })
}

/// Serializes a response into a storable record.
///
/// A `date` header is synthesized from the wall clock when the response
/// does not expose one.
pub fn response_to_record(response: &HttpResponse) -> CodecResult<ResponseRecord> {
    let mut headers = headers_to_map(&response.headers);
    ensure_date_header(&mut headers);
    Ok(ResponseRecord {
        status: response.status.as_u16(),
        status_text: response.status_text.clone(),
        url: response.url.clone(),
        headers,
        body: capture_body(&response.body, response.content_type(), false)?,
    })
}

/// Rebuilt body plus the content type it must be sent with, if any.
struct RebuiltBody {
    bytes: Bytes,
    content_type: Option<String>,
}

fn rebuild_body(body: &BodyRecord) -> RebuiltBody {
    match body {
        BodyRecord::Empty => RebuiltBody {
            bytes: Bytes::new(),
            content_type: None,
        },
        BodyRecord::Text(text) => RebuiltBody {
            bytes: Bytes::from(text.clone()),
            content_type: None,
        },
        BodyRecord::Binary(data) => RebuiltBody {
            bytes: Bytes::from(data.clone()),
            content_type: None,
        },
        BodyRecord::Multipart(fields) => {
            let boundary = generate_boundary();
            RebuiltBody {
                bytes: Bytes::from(encode_multipart(fields, &boundary)),
                content_type: Some(multipart_content_type(&boundary)),
            }
        }
    }
}

fn headers_for(
    headers: &BTreeMap<String, String>,
    rebuilt: &RebuiltBody,
) -> CodecResult<http::HeaderMap> {
    // A rebuilt form carries a new boundary; the stored content-type is stale.
    let skip: &[&str] = if rebuilt.content_type.is_some() {
        &["content-type"]
    } else {
        &[]
    };
    let mut map = map_to_headers(headers, skip)?;
    if let Some(ct) = &rebuilt.content_type {
        let value = HeaderValue::from_str(ct)
            .map_err(|e| CodecError::invalid_record(format!("content type {ct:?}: {e}")))?;
        map.insert(CONTENT_TYPE, value);
    }
    Ok(map)
}

/// Rebuilds a request from its record.
pub fn request_from_record(record: &RequestRecord) -> CodecResult<HttpRequest> {
    let method = Method::from_bytes(record.method.as_bytes())
        .map_err(|e| CodecError::invalid_record(format!("method {:?}: {e}", record.method)))?;
    let rebuilt = rebuild_body(&record.body);
    let headers = headers_for(&record.headers, &rebuilt)?;

    Ok(HttpRequest {
        method,
        url: record.url.clone(),
        headers,
        body: rebuilt.bytes,
        options: record.options.clone(),
    })
}

/// Rebuilds a response from its record.
///
/// A binary body yields a response reporting [`ResponseType::Binary`].
pub fn response_from_record(record: &ResponseRecord) -> CodecResult<HttpResponse> {
    let status = StatusCode::from_u16(record.status)
        .map_err(|e| CodecError::invalid_record(format!("status {}: {e}", record.status)))?;
    let rebuilt = rebuild_body(&record.body);
    let headers = headers_for(&record.headers, &rebuilt)?;
    let response_type = match record.body {
        BodyRecord::Binary(_) => ResponseType::Binary,
        _ => ResponseType::Basic,
    };

    Ok(HttpResponse {
        status,
        status_text: record.status_text.clone(),
        url: record.url.clone(),
        headers,
        body: rebuilt.bytes,
        response_type,
    })
}

impl RequestRecord {
    /// Converts the record into a JSON value for storage.
    pub fn to_json(&self) -> CodecResult<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| CodecError::invalid_record(e.to_string()))
    }

    /// Reads a record back from its stored JSON value.
    pub fn from_json(value: serde_json::Value) -> CodecResult<Self> {
        serde_json::from_value(value).map_err(|e| CodecError::invalid_record(e.to_string()))
    }
}

impl ResponseRecord {
    /// Converts the record into a JSON value for storage.
    pub fn to_json(&self) -> CodecResult<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| CodecError::invalid_record(e.to_string()))
    }

    /// Reads a record back from its stored JSON value.
    pub fn from_json(value: serde_json::Value) -> CodecResult<Self> {
        serde_json::from_value(value).map_err(|e| CodecError::invalid_record(e.to_string()))
    }
}
