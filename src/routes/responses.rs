use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::AppState;
use crate::error::ProxyError;
use crate::transforms::stream_passthrough;

use super::{payload_tail, sse_response};

/// Verbatim Responses API passthrough
pub async fn responses(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Response {
    debug!("Responses API request payload: {}", payload_tail(&body));

    let stream = body.get("stream").and_then(Value::as_bool).unwrap_or(false);

    let response = match state.copilot.create_responses(&body).await {
        Ok(r) => r,
        Err(err) => return err.to_openai_response(),
    };

    if stream {
        debug!("Streaming responses");
        return sse_response(stream_passthrough(response.bytes_stream()));
    }

    match response.json::<Value>().await {
        Ok(json_response) => Json(json_response).into_response(),
        Err(e) => {
            ProxyError::ParseError(format!("Failed to parse response: {}", e)).to_openai_response()
        }
    }
}
