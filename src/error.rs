use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("No Copilot token configured")]
    NoTokenConfigured,

    #[error("Upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProxyError {
    fn status(&self) -> StatusCode {
        match self {
            ProxyError::NoTokenConfigured => StatusCode::UNAUTHORIZED,
            ProxyError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ProxyError::ModelNotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::Tokenizer(_) | ProxyError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::NetworkError(_) | ProxyError::ParseError(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Convert error to OpenAI-compatible error response
    pub fn to_openai_response(&self) -> Response {
        // Upstream bodies are already OpenAI-shaped, forward them as-is
        if let ProxyError::Upstream { body, .. } = self {
            return (self.status(), body.clone()).into_response();
        }
        (self.status(), Json(json!({ "error": { "message": self.to_string() } }))).into_response()
    }

    /// Convert error to Anthropic-compatible error response
    pub fn to_anthropic_response(&self) -> Response {
        let error_type = match self {
            ProxyError::NoTokenConfigured => "authentication_error",
            ProxyError::ModelNotFound(_) => "not_found_error",
            ProxyError::Upstream { status: 429, .. } => "rate_limit_error",
            ProxyError::Upstream { status, .. } if (400..500).contains(status) => {
                "invalid_request_error"
            }
            _ => "api_error",
        };

        (
            self.status(),
            Json(json!({
                "type": "error",
                "error": {
                    "type": error_type,
                    "message": self.to_string()
                }
            })),
        )
            .into_response()
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        // Default to Anthropic format
        self.to_anthropic_response()
    }
}
