pub mod anthropic;
pub mod health;
pub mod openai;
pub mod responses;

use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures_util::Stream;
use serde::Serialize;

use crate::constants::DEBUG_PAYLOAD_TAIL;

/// Wrap a byte stream as a `text/event-stream` response
pub(crate) fn sse_response(
    stream: impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

/// Last few hundred characters of a JSON payload, for debug logs
pub(crate) fn payload_tail(payload: &impl Serialize) -> String {
    let json = serde_json::to_string(payload).unwrap_or_default();
    let skip = json.chars().count().saturating_sub(DEBUG_PAYLOAD_TAIL);
    json.chars().skip(skip).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_payload_tail_truncates_from_the_front() {
        let long = json!({ "text": "é".repeat(1000) });
        let tail = payload_tail(&long);
        assert_eq!(tail.chars().count(), DEBUG_PAYLOAD_TAIL);
        assert!(tail.ends_with("\"}"));

        assert_eq!(payload_tail(&json!({"a": 1})), r#"{"a":1}"#);
    }

    #[test]
    fn test_sse_response_headers() {
        let resp = sse_response(futures_util::stream::empty::<Result<Bytes, std::io::Error>>());
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/event-stream");
    }
}
