use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::AppState;
use crate::constants::PLACEHOLDER_TOKEN_COUNT;
use crate::error::ProxyError;
use crate::models::{BetaFeatures, CapabilityRegistry};
use crate::transforms::{
    AnthropicMessagesPayload, ChatCompletionResponse, estimate_input_tokens,
    stream_openai_to_anthropic, translate_to_anthropic, translate_to_openai,
};

use super::{payload_tail, sse_response};

fn anthropic_beta(headers: &HeaderMap) -> Option<&str> {
    headers.get("anthropic-beta").and_then(|v| v.to_str().ok())
}

pub async fn messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<AnthropicMessagesPayload>,
) -> Response {
    let beta = anthropic_beta(&headers);
    let translated = translate_to_openai(&payload, beta);
    debug!("Translated chat payload: {}", payload_tail(&translated));

    let caps = CapabilityRegistry::shared().lookup(&translated.model);
    debug!(
        model = %translated.model,
        thinking_mode = caps.thinking_mode,
        supported_efforts = ?caps.supported_reasoning_efforts,
        supports_tool_choice = ?caps.supports_tool_choice,
        supports_parallel_tool_calls = ?caps.supports_parallel_tool_calls,
        "Model capabilities"
    );

    let response = match state.copilot.create_chat_completions(&translated).await {
        Ok(r) => r,
        Err(err) => return err.to_anthropic_response(),
    };

    if translated.stream.unwrap_or(false) {
        return sse_response(stream_openai_to_anthropic(response.bytes_stream()));
    }

    let completion = match response.json::<ChatCompletionResponse>().await {
        Ok(r) => r,
        Err(e) => {
            return ProxyError::ParseError(format!("Failed to parse response: {}", e))
                .to_anthropic_response();
        }
    };

    let anthropic_response = translate_to_anthropic(&completion);
    debug!("Translated Anthropic response: {}", payload_tail(&anthropic_response));
    Json(anthropic_response).into_response()
}

/// Always answers 200: counting is advisory and degrades to a placeholder.
pub async fn count_tokens(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<AnthropicMessagesPayload>, JsonRejection>,
) -> Json<Value> {
    let Json(payload) = match payload {
        Ok(p) => p,
        Err(e) => {
            warn!("Unreadable count_tokens payload: {}", e);
            return Json(json!({ "input_tokens": PLACEHOLDER_TOKEN_COUNT }));
        }
    };

    let beta_header = anthropic_beta(&headers);
    let translated = translate_to_openai(&payload, beta_header);
    let model = state.catalog.find_with_fallback(&translated.model).await;

    let input_tokens = estimate_input_tokens(
        state.token_counter.as_ref(),
        &payload,
        &translated,
        model.as_ref(),
        &BetaFeatures::parse(beta_header),
    );

    Json(json!({ "input_tokens": input_tokens }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AccountType, Config, CorsMode};
    use crate::copilot::CopilotClient;
    use crate::models::catalog::UpstreamCapabilities;
    use crate::models::{ModelCatalog, UpstreamModel};
    use crate::transforms::ChatCompletionsPayload;
    use crate::transforms::tokens::{TokenCount, TokenCounter};
    use axum::body::Body;
    use axum::extract::FromRequest;
    use axum::http::{Request, header};
    use std::path::PathBuf;

    struct FixedCounter;

    impl TokenCounter for FixedCounter {
        fn count(
            &self,
            _payload: &ChatCompletionsPayload,
            _model: &UpstreamModel,
        ) -> Result<TokenCount, ProxyError> {
            Ok(TokenCount {
                input: 40,
                output: 2,
            })
        }
    }

    fn state() -> Arc<AppState> {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 4141,
            data_dir: PathBuf::from("/tmp/copilot-proxy-test"),
            account_type: AccountType::Individual,
            copilot_token: None,
            vscode_version: "1.0".to_string(),
            cors_mode: CorsMode::LocalhostOnly,
        };
        Arc::new(AppState {
            copilot: CopilotClient::new(&config).unwrap(),
            catalog: ModelCatalog::new(),
            token_counter: Box::new(FixedCounter),
        })
    }

    fn gpt_model() -> UpstreamModel {
        UpstreamModel {
            id: "gpt-4o".to_string(),
            name: "GPT-4o".to_string(),
            vendor: "Azure OpenAI".to_string(),
            version: "gpt-4o".to_string(),
            preview: false,
            capabilities: UpstreamCapabilities::default(),
        }
    }

    async fn parse(body: &'static str) -> Result<Json<AnthropicMessagesPayload>, JsonRejection> {
        let request = Request::builder()
            .method("POST")
            .uri("/v1/messages/count_tokens")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();
        Json::<AnthropicMessagesPayload>::from_request(request, &()).await
    }

    const HELLO: &str =
        r#"{"model":"gpt-4o","messages":[{"role":"user","content":"Hello!"}],"max_tokens":10}"#;

    #[tokio::test]
    async fn test_count_tokens_unreadable_body_returns_placeholder() {
        let payload = parse("{not json").await;
        assert!(payload.is_err());

        let Json(body) = count_tokens(State(state()), HeaderMap::new(), payload).await;
        assert_eq!(body, json!({ "input_tokens": 1 }));
    }

    #[tokio::test]
    async fn test_count_tokens_unloaded_catalog_returns_placeholder() {
        let Json(body) = count_tokens(State(state()), HeaderMap::new(), parse(HELLO).await).await;
        assert_eq!(body, json!({ "input_tokens": 1 }));
    }

    #[tokio::test]
    async fn test_count_tokens_with_catalog_model() {
        let state = state();
        state.catalog.replace(vec![gpt_model()]).await;

        let Json(body) = count_tokens(State(state), HeaderMap::new(), parse(HELLO).await).await;
        assert_eq!(body, json!({ "input_tokens": 42 }));
    }
}
