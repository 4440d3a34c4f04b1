//! Property tests for request record round-trips.

use proptest::prelude::*;
use synclog_codec::{
    request_from_record, request_to_record, BodyRecord, HeaderName, HeaderValue, HttpRequest,
    Method,
};

fn method_strategy() -> impl Strategy<Value = Method> {
    prop_oneof![
        Just(Method::GET),
        Just(Method::POST),
        Just(Method::PUT),
        Just(Method::PATCH),
        Just(Method::DELETE),
    ]
}

fn header_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(("x-[a-z]{1,8}", "[a-zA-Z0-9 ,;=]{0,24}"), 0..4)
}

proptest! {
    #[test]
    fn text_requests_round_trip(
        method in method_strategy(),
        path in "[a-z]{1,12}",
        headers in header_strategy(),
        body in "\\PC{0,64}",
    ) {
        let mut request = HttpRequest::new(method, format!("https://api.test/{path}"))
            .with_content_type("application/json")
            .with_body(body.clone());
        for (name, value) in &headers {
            request = request.with_header(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value.trim()).unwrap(),
            );
        }

        let record = request_to_record(&request).unwrap();
        prop_assert_eq!(&record.body, &BodyRecord::Text(body));

        let rebuilt = request_from_record(&record).unwrap();
        prop_assert_eq!(rebuilt.method, request.method);
        prop_assert_eq!(rebuilt.url, request.url);
        prop_assert_eq!(rebuilt.headers, request.headers);
        prop_assert_eq!(rebuilt.body, request.body);
    }

    #[test]
    fn binary_requests_round_trip(data in prop::collection::vec(any::<u8>(), 1..256)) {
        prop_assume!(std::str::from_utf8(&data).is_err());
        let request = HttpRequest::put("https://api.test/blob").with_body(data.clone());

        let record = request_to_record(&request).unwrap();
        let json = record.to_json().unwrap();
        let restored = synclog_codec::RequestRecord::from_json(json).unwrap();
        let rebuilt = request_from_record(&restored).unwrap();
        prop_assert_eq!(rebuilt.body.as_ref(), data.as_slice());
    }
}
