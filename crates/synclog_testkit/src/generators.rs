//! Property-based test generators using proptest.
//!
//! Provides strategies for generating requests and queues.

use proptest::prelude::*;
use synclog_codec::{HttpRequest, Method};

/// Strategy for request methods, reads and mutations alike.
pub fn method_strategy() -> impl Strategy<Value = Method> {
    prop_oneof![
        Just(Method::GET),
        Just(Method::HEAD),
        Just(Method::POST),
        Just(Method::PUT),
        Just(Method::PATCH),
        Just(Method::DELETE),
    ]
}

/// Strategy for mutating request methods.
pub fn mutating_method_strategy() -> impl Strategy<Value = Method> {
    prop_oneof![
        Just(Method::POST),
        Just(Method::PUT),
        Just(Method::PATCH),
        Just(Method::DELETE),
    ]
}

/// Strategy for URLs under a fixed test origin.
pub fn url_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("/[a-z]{1,8}(/[0-9]{1,4})?")
        .expect("Invalid regex")
        .prop_map(|path| format!("https://api.example.com{path}"))
}

/// Strategy for small JSON-ish text bodies.
pub fn text_body_strategy() -> impl Strategy<Value = String> {
    prop::collection::btree_map("[a-z]{1,6}", any::<i32>(), 0..4).prop_map(|fields| {
        let pairs: Vec<String> = fields
            .iter()
            .map(|(key, value)| format!("\"{key}\":{value}"))
            .collect();
        format!("{{{}}}", pairs.join(","))
    })
}

/// Strategy for requests with a JSON body (reads carry no body).
pub fn request_strategy() -> impl Strategy<Value = HttpRequest> {
    (method_strategy(), url_strategy(), text_body_strategy()).prop_map(|(method, url, body)| {
        let request = HttpRequest::new(method, url);
        if request.is_read_only() {
            request
        } else {
            request
                .with_content_type("application/json")
                .with_body(body)
        }
    })
}

/// Strategy for mutating requests only.
pub fn mutating_request_strategy() -> impl Strategy<Value = HttpRequest> {
    (mutating_method_strategy(), url_strategy(), text_body_strategy()).prop_map(
        |(method, url, body)| {
            HttpRequest::new(method, url)
                .with_content_type("application/json")
                .with_body(body)
        },
    )
}

/// Strategy for a queue of up to `max` requests.
pub fn queue_strategy(max: usize) -> impl Strategy<Value = Vec<HttpRequest>> {
    prop::collection::vec(request_strategy(), 0..=max)
}
