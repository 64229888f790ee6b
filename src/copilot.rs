//! Copilot upstream client.

use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};
use uuid::Uuid;

use crate::config::Config;
use crate::constants::{
    COPILOT_CHAT_VERSION, COPILOT_INTEGRATION_ID, GITHUB_API_VERSION, USER_AGENT,
};
use crate::error::ProxyError;
use crate::models::ModelsResponse;
use crate::transforms::ChatCompletionsPayload;

/// Who started the turn, reported upstream as `X-Initiator`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initiator {
    User,
    Agent,
}

impl Initiator {
    pub fn as_str(self) -> &'static str {
        match self {
            Initiator::User => "user",
            Initiator::Agent => "agent",
        }
    }

    fn from_agent_flag(is_agent: bool) -> Self {
        if is_agent { Initiator::Agent } else { Initiator::User }
    }
}

/// Build a request to the Copilot API with the editor headers it expects
pub fn build_copilot_request(
    client: &Client,
    method: Method,
    url: &str,
    token: &str,
    vscode_version: &str,
    vision: bool,
    initiator: Option<Initiator>,
) -> RequestBuilder {
    let mut builder = client
        .request(method, url)
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .header("copilot-integration-id", COPILOT_INTEGRATION_ID)
        .header("editor-version", format!("vscode/{}", vscode_version))
        .header("editor-plugin-version", format!("copilot-chat/{}", COPILOT_CHAT_VERSION))
        .header("user-agent", USER_AGENT)
        .header("openai-intent", "conversation-panel")
        .header("x-github-api-version", GITHUB_API_VERSION)
        .header("x-request-id", Uuid::new_v4().to_string())
        .header("x-vscode-user-agent-library-version", "electron-fetch");

    if vision {
        builder = builder.header("copilot-vision-request", "true");
    }
    if let Some(initiator) = initiator {
        builder = builder.header("X-Initiator", initiator.as_str());
    }
    builder
}

pub struct CopilotClient {
    http: Client,
    base_url: String,
    token: Option<String>,
    vscode_version: String,
}

impl CopilotClient {
    pub fn new(config: &Config) -> Result<Self, ProxyError> {
        // No overall timeout: streamed completions can run for minutes
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url().to_string(),
            token: config.copilot_token.clone(),
            vscode_version: config.vscode_version.clone(),
        })
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        vision: bool,
        initiator: Option<Initiator>,
    ) -> Result<RequestBuilder, ProxyError> {
        let token = self.token.as_deref().ok_or(ProxyError::NoTokenConfigured)?;
        let url = format!("{}{}", self.base_url, path);
        Ok(build_copilot_request(
            &self.http,
            method,
            &url,
            token,
            &self.vscode_version,
            vision,
            initiator,
        ))
    }

    async fn send(
        &self,
        path: &str,
        body: &impl Serialize,
        vision: bool,
        initiator: Initiator,
    ) -> Result<reqwest::Response, ProxyError> {
        let response = self
            .request(Method::POST, path, vision, Some(initiator))?
            .json(body)
            .send()
            .await?;
        check_status(path, response).await
    }

    /// `POST /chat/completions` with a translated payload. The caller
    /// decides whether to read the body as JSON or as an SSE stream.
    pub async fn create_chat_completions(
        &self,
        payload: &ChatCompletionsPayload,
    ) -> Result<reqwest::Response, ProxyError> {
        let initiator = Initiator::from_agent_flag(payload.is_agent_call());
        self.send("/chat/completions", payload, payload.has_vision_input(), initiator)
            .await
    }

    /// `POST /chat/completions` with a client payload forwarded verbatim
    pub async fn forward_chat_completions(
        &self,
        payload: &Value,
    ) -> Result<reqwest::Response, ProxyError> {
        let initiator = Initiator::from_agent_flag(chat_is_agent_call(payload));
        self.send("/chat/completions", payload, chat_has_vision(payload), initiator)
            .await
    }

    /// `POST /responses`, forwarded verbatim
    pub async fn create_responses(&self, payload: &Value) -> Result<reqwest::Response, ProxyError> {
        let initiator = Initiator::from_agent_flag(responses_is_agent_call(payload));
        self.send("/responses", payload, responses_has_vision(payload), initiator)
            .await
    }

    pub async fn get_models(&self) -> Result<ModelsResponse, ProxyError> {
        let response = self.request(Method::GET, "/models", false, None)?.send().await?;
        let response = check_status("/models", response).await?;
        response
            .json::<ModelsResponse>()
            .await
            .map_err(|e| ProxyError::ParseError(format!("Failed to parse models: {}", e)))
    }
}

async fn check_status(
    path: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProxyError> {
    let status = response.status();
    if status.is_success() {
        debug!("Upstream {} returned {}", path, status);
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!("Upstream {} failed with {}: {}", path, status, body);
    Err(ProxyError::Upstream {
        status: status.as_u16(),
        body,
    })
}

// ============================================================================
// Verbatim Payload Inspection
// ============================================================================

const VISION_PART_TYPES: [&str; 4] = ["input_image", "image", "image_url", "image_file"];

fn items<'a>(payload: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    payload
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn role_is(item: &Value, roles: &[&str]) -> bool {
    item.get("role")
        .and_then(Value::as_str)
        .is_some_and(|r| roles.contains(&r))
}

fn has_vision_part(item: &Value, part_types: &[&str]) -> bool {
    items(item, "content").any(|part| {
        part.get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| part_types.contains(&t))
    })
}

pub fn chat_is_agent_call(payload: &Value) -> bool {
    items(payload, "messages").any(|m| role_is(m, &["assistant", "tool"]))
}

pub fn chat_has_vision(payload: &Value) -> bool {
    items(payload, "messages").any(|m| has_vision_part(m, &["image_url"]))
}

pub fn responses_is_agent_call(payload: &Value) -> bool {
    items(payload, "input").any(|item| role_is(item, &["assistant"]))
}

pub fn responses_has_vision(payload: &Value) -> bool {
    items(payload, "input").any(|item| has_vision_part(item, &VISION_PART_TYPES))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_headers() {
        let client = Client::new();
        let req = build_copilot_request(
            &client,
            Method::POST,
            "https://api.githubcopilot.com/chat/completions",
            "tok",
            "1.104.3",
            true,
            Some(Initiator::Agent),
        )
        .build()
        .unwrap();

        let h = req.headers();
        assert_eq!(h["authorization"], "Bearer tok");
        assert_eq!(h["copilot-integration-id"], "vscode-chat");
        assert_eq!(h["editor-version"], "vscode/1.104.3");
        assert_eq!(h["editor-plugin-version"], "copilot-chat/0.26.7");
        assert_eq!(h["openai-intent"], "conversation-panel");
        assert_eq!(h["x-github-api-version"], GITHUB_API_VERSION);
        assert_eq!(h["copilot-vision-request"], "true");
        assert_eq!(h["x-initiator"], "agent");
        assert!(Uuid::parse_str(h["x-request-id"].to_str().unwrap()).is_ok());
    }

    #[test]
    fn test_request_headers_without_vision_or_initiator() {
        let client = Client::new();
        let req = build_copilot_request(
            &client,
            Method::GET,
            "https://example.com/models",
            "tok",
            "1.0",
            false,
            None,
        )
        .build()
        .unwrap();
        assert!(req.headers().get("copilot-vision-request").is_none());
        assert!(req.headers().get("x-initiator").is_none());
    }

    #[test]
    fn test_responses_detection() {
        let user_only = json!({
            "model": "gpt-5",
            "input": [{"role": "user", "content": "hi"}]
        });
        assert!(!responses_is_agent_call(&user_only));
        assert!(!responses_has_vision(&user_only));

        let agent = json!({
            "model": "gpt-5",
            "input": [
                {"role": "user", "content": [{"type": "input_text", "text": "look"}, {"type": "input_image", "image_url": "data:..."}]},
                {"role": "assistant", "content": "ok"}
            ]
        });
        assert!(responses_is_agent_call(&agent));
        assert!(responses_has_vision(&agent));

        // Function call outputs carry no role
        assert!(!responses_is_agent_call(&json!({"input": [{"type": "function_call_output", "output": "x"}]})));
        assert!(!responses_is_agent_call(&json!({"input": "plain string"})));
    }

    #[test]
    fn test_chat_detection() {
        let payload = json!({
            "messages": [
                {"role": "user", "content": [{"type": "image_url", "image_url": {"url": "https://x/y.png"}}]},
                {"role": "tool", "tool_call_id": "c", "content": "done"}
            ]
        });
        assert!(chat_is_agent_call(&payload));
        assert!(chat_has_vision(&payload));

        let plain = json!({"messages": [{"role": "user", "content": "hi"}]});
        assert!(!chat_is_agent_call(&plain));
        assert!(!chat_has_vision(&plain));
    }

    #[test]
    fn test_missing_token() {
        let client = CopilotClient {
            http: Client::new(),
            base_url: "https://api.githubcopilot.com".to_string(),
            token: None,
            vscode_version: "1.0".to_string(),
        };
        assert!(!client.has_token());
        assert!(matches!(
            client.request(Method::POST, "/chat/completions", false, None),
            Err(ProxyError::NoTokenConfigured)
        ));
    }
}
