//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde_json::{json, Value};
use synclog_codec::{encode_multipart, header, multipart_content_type, FormField, HeaderValue, HttpRequest};

/// Boundary used by generated forms.
pub const BENCH_BOUNDARY: &str = "----bench-boundary";

/// Generate deterministic binary data of the specified size.
pub fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

/// Generate a JSON document with `fields` entries.
pub fn json_document(fields: usize) -> Value {
    let map = (0..fields)
        .map(|i| (format!("field_{i}"), json!(format!("value {i}"))))
        .collect();
    Value::Object(map)
}

/// Generate a form with one text field and one binary field of `size` bytes.
pub fn form_fields(size: usize) -> Vec<FormField> {
    vec![
        FormField::text("caption", "benchmark upload"),
        FormField::binary("photo", "image/png", payload(size)).with_filename("photo.png"),
    ]
}

/// Build a multipart `POST` carrying [`form_fields`].
pub fn multipart_request(url: &str, size: usize) -> HttpRequest {
    let content_type = HeaderValue::from_str(&multipart_content_type(BENCH_BOUNDARY))
        .unwrap_or_else(|_| HeaderValue::from_static("multipart/form-data"));
    HttpRequest::post(url)
        .with_header(header::CONTENT_TYPE, content_type)
        .with_body(encode_multipart(&form_fields(size), BENCH_BOUNDARY))
}

/// Build a JSON `POST` with `fields` entries.
pub fn json_request(url: &str, fields: usize) -> HttpRequest {
    HttpRequest::post(url)
        .with_content_type("application/json")
        .with_body(json_document(fields).to_string())
}
