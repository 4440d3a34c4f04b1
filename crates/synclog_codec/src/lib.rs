//! # synclog codec
//!
//! Lossless conversion between live HTTP messages and plain, storable
//! records.
//!
//! Queued requests outlive the process that created them, so they are kept
//! as [`RequestRecord`]s: a method, URL, header map, body variant and the
//! public request properties. Responses handed to interception listeners
//! can be captured the same way as [`ResponseRecord`]s.
//!
//! ## Body capture
//!
//! Bodies are captured in priority order:
//! 1. `multipart/*` content → parsed into [`FormField`]s; binary parts are
//!    base64 octet streams decoded into bytes tagged with their content type
//! 2. any request, or a `text/*` / JSON content type → decoded text
//! 3. anything else → a binary buffer (omitted when empty)
//!
//! ## Usage
//!
//! ```
//! use synclog_codec::{request_from_record, request_to_record, HttpRequest};
//!
//! let request = HttpRequest::post("https://api.example.com/orders")
//!     .with_content_type("application/json")
//!     .with_body(r#"{"sku":"A-1"}"#);
//!
//! let record = request_to_record(&request).unwrap();
//! let rebuilt = request_from_record(&record).unwrap();
//! assert_eq!(rebuilt.body, request.body);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod base64_serde;
mod error;
mod headers;
mod message;
mod multipart;
mod record;

pub use error::{CodecError, CodecResult};
pub use headers::{ensure_date_header, headers_to_map, http_date, map_to_headers, DATE_HEADER};
pub use message::{HttpRequest, HttpResponse, ResponseType};
pub use multipart::{
    boundary_from_content_type, encode_multipart, generate_boundary, is_binary_part,
    is_multipart, multipart_content_type, parse_multipart, FieldValue, FormField,
};
pub use record::{
    request_from_record, request_to_record, response_from_record, response_to_record,
    BodyRecord, RequestRecord, ResponseRecord,
};

// Re-exported so downstream crates name the same types.
pub use bytes::Bytes;
pub use http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
