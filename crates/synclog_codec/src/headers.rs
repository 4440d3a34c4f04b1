//! Header map conversion.

use crate::error::{CodecError, CodecResult};
use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderName, HeaderValue};
use std::collections::BTreeMap;

/// Name of the header synthesized when a response does not expose one.
pub const DATE_HEADER: &str = "date";

/// Converts a header map to a plain map with lower-cased names.
///
/// Repeated headers are joined with `", "`.
pub fn headers_to_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        map.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    map
}

/// Rebuilds a header map, leaving out any names listed in `skip`.
///
/// `skip` is matched case-insensitively.
pub fn map_to_headers(map: &BTreeMap<String, String>, skip: &[&str]) -> CodecResult<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(map.len());
    for (name, value) in map {
        if skip.iter().any(|s| s.eq_ignore_ascii_case(name)) {
            continue;
        }
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| CodecError::invalid_record(format!("header name {name:?}: {e}")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| CodecError::invalid_record(format!("header {name:?}: {e}")))?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

/// Formats a timestamp as an IMF-fixdate (`Sun, 06 Nov 1994 08:49:37 GMT`).
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Adds a `date` header holding the current time if none is present.
///
/// Cross-origin responses frequently hide `date`; downstream cache logic
/// needs one, so the wall clock stands in.
pub fn ensure_date_header(map: &mut BTreeMap<String, String>) {
    map.entry(DATE_HEADER.to_string())
        .or_insert_with(|| http_date(Utc::now()));
}
