use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::AppState;
use crate::error::ProxyError;
use crate::models::UpstreamModel;
use crate::transforms::stream_passthrough;

use super::{payload_tail, sse_response};

fn model_entry(model: &UpstreamModel) -> Value {
    json!({
        "id": model.id,
        "object": "model",
        "type": "model",
        "created": 0,
        "created_at": "1970-01-01T00:00:00.000Z",
        "owned_by": model.vendor,
        "display_name": model.name,
    })
}

pub async fn list_models(State(state): State<Arc<AppState>>) -> Response {
    if !state.catalog.is_loaded().await
        && let Err(err) = state.refresh_models().await
    {
        return err.to_openai_response();
    }

    let models: Vec<Value> = state.catalog.list().await.iter().map(model_entry).collect();

    Json(json!({
        "object": "list",
        "data": models,
        "has_more": false
    }))
    .into_response()
}

/// Verbatim chat-completions passthrough
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Response {
    debug!("Chat completions payload: {}", payload_tail(&body));

    let stream = body.get("stream").and_then(Value::as_bool).unwrap_or(false);

    let response = match state.copilot.forward_chat_completions(&body).await {
        Ok(r) => r,
        Err(err) => return err.to_openai_response(),
    };

    if stream {
        return sse_response(stream_passthrough(response.bytes_stream()));
    }

    match response.json::<Value>().await {
        Ok(json_response) => Json(json_response).into_response(),
        Err(e) => {
            warn!("Unparseable chat completion from upstream: {}", e);
            ProxyError::ParseError(format!("Failed to parse response: {}", e)).to_openai_response()
        }
    }
}
