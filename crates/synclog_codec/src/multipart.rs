//! `multipart/form-data` parsing and encoding.
//!
//! Binary parts travel as base64 text with their content type; on parse
//! they are decoded back into bytes tagged with that content type.

use crate::error::{CodecError, CodecResult};
use base64::engine::general_purpose;
use base64::Engine as _;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

/// One field of a multipart form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    /// Field name from `Content-Disposition`.
    pub name: String,
    /// Optional file name from `Content-Disposition`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Part content type, if the part declared one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Field value.
    pub value: FieldValue,
}

impl FormField {
    /// Creates a text field.
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filename: None,
            content_type: None,
            value: FieldValue::Text(value.into()),
        }
    }

    /// Creates a binary field tagged with its content type.
    pub fn binary(
        name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            filename: None,
            content_type: Some(content_type.into()),
            value: FieldValue::Binary(data.into()),
        }
    }

    /// Sets the file name.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// Value of a form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum FieldValue {
    /// Text value.
    Text(String),
    /// Binary value, base64 in serialized form.
    Binary(#[serde(with = "crate::base64_serde")] Vec<u8>),
}

fn boundary_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)boundary=(?:"([^"]+)"|([^;\s]+))"#).expect("boundary regex is valid")
    })
}

fn attribute_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(\w+)="([^"]*)""#).expect("attribute regex is valid"))
}

/// Returns true if the content type denotes a multipart body.
pub fn is_multipart(content_type: &str) -> bool {
    content_type
        .trim_start()
        .to_ascii_lowercase()
        .starts_with("multipart/")
}

/// Returns true if a part with this content type carries base64 binary data.
pub fn is_binary_part(content_type: &str) -> bool {
    let lower = content_type.to_ascii_lowercase();
    lower.contains("image") || lower.contains("octet-stream")
}

/// Extracts the boundary token from a multipart content type.
///
/// Both `boundary=abc` and `boundary="abc"` are accepted.
pub fn boundary_from_content_type(content_type: &str) -> CodecResult<String> {
    boundary_regex()
        .captures(content_type)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| CodecError::MissingBoundary {
            content_type: content_type.to_string(),
        })
}

/// Parses a multipart body into its fields.
///
/// The preamble before the first boundary and the closing marker are
/// discarded. Each part is split into headers and data on the first blank
/// line.
pub fn parse_multipart(body: &str, content_type: &str) -> CodecResult<Vec<FormField>> {
    let boundary = boundary_from_content_type(content_type)?;
    let delimiter = format!("--{boundary}");

    let mut segments: Vec<&str> = body.split(delimiter.as_str()).collect();
    if segments.len() < 2 {
        return Err(CodecError::malformed_part(format!(
            "boundary {boundary:?} not found in body"
        )));
    }
    segments.remove(0);
    if segments.last().is_some_and(|s| s.starts_with("--")) {
        segments.pop();
    }

    segments.into_iter().map(parse_part).collect()
}

fn parse_part(segment: &str) -> CodecResult<FormField> {
    let segment = strip_leading_newline(segment);
    let (head, data) = match segment.find("\r\n\r\n") {
        Some(i) => (&segment[..i], &segment[i + 4..]),
        None => match segment.find("\n\n") {
            Some(i) => (&segment[..i], &segment[i + 2..]),
            None => return Err(CodecError::malformed_part("no blank line after part headers")),
        },
    };
    let data = strip_trailing_newline(data);

    let mut name = None;
    let mut filename = None;
    let mut content_type = None;

    for line in head.lines() {
        let line = line.trim();
        if let Some((key, value)) = line.split_once(':') {
            if key.trim().eq_ignore_ascii_case("content-type") {
                content_type = Some(value.trim().to_string());
                continue;
            }
        }
        for caps in attribute_regex().captures_iter(line) {
            match &caps[1] {
                "name" => name = Some(caps[2].to_string()),
                "filename" => filename = Some(caps[2].to_string()),
                _ => {}
            }
        }
    }

    let name = name.ok_or_else(|| CodecError::malformed_part("part has no name attribute"))?;

    let value = match content_type.as_deref() {
        Some(ct) if is_binary_part(ct) => {
            let compact: String = data.split_whitespace().collect();
            let bytes = general_purpose::STANDARD.decode(compact).map_err(|e| {
                CodecError::unsupported_payload(format!("binary part {name:?} is not base64: {e}"))
            })?;
            FieldValue::Binary(bytes)
        }
        _ => FieldValue::Text(data.to_string()),
    };

    Ok(FormField {
        name,
        filename,
        content_type,
        value,
    })
}

fn strip_leading_newline(s: &str) -> &str {
    s.strip_prefix("\r\n")
        .or_else(|| s.strip_prefix('\n'))
        .unwrap_or(s)
}

fn strip_trailing_newline(s: &str) -> &str {
    s.strip_suffix("\r\n")
        .or_else(|| s.strip_suffix('\n'))
        .unwrap_or(s)
}

/// Generates a boundary token unlikely to collide with field data.
pub fn generate_boundary() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("----synclog-boundary-{nanos:x}{n:04x}")
}

/// Encodes fields as a multipart body using `boundary`.
///
/// Binary fields are written as base64 with their content type
/// (`application/octet-stream` when none is set).
pub fn encode_multipart(fields: &[FormField], boundary: &str) -> String {
    let mut out = String::new();
    for field in fields {
        out.push_str("--");
        out.push_str(boundary);
        out.push_str("\r\n");
        out.push_str(&format!(
            "Content-Disposition: form-data; name=\"{}\"",
            field.name
        ));
        if let Some(filename) = &field.filename {
            out.push_str(&format!("; filename=\"{filename}\""));
        }
        out.push_str("\r\n");

        let content_type = match (&field.value, &field.content_type) {
            (_, Some(ct)) => Some(ct.as_str()),
            (FieldValue::Binary(_), None) => Some("application/octet-stream"),
            (FieldValue::Text(_), None) => None,
        };
        if let Some(ct) = content_type {
            out.push_str(&format!("Content-Type: {ct}\r\n"));
        }
        out.push_str("\r\n");

        match &field.value {
            FieldValue::Text(text) => out.push_str(text),
            FieldValue::Binary(data) => out.push_str(&general_purpose::STANDARD.encode(data)),
        }
        out.push_str("\r\n");
    }
    out.push_str("--");
    out.push_str(boundary);
    out.push_str("--\r\n");
    out
}

/// Returns the `content-type` header value for a body encoded with `boundary`.
pub fn multipart_content_type(boundary: &str) -> String {
    format!("multipart/form-data; boundary={boundary}")
}
