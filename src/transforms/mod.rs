//! Request/response transformations between the Anthropic Messages API
//! and the Copilot chat-completions API.
//!
//! This module provides:
//! - `anthropic` / `openai`: wire types for both protocols
//! - `request`: Anthropic request → chat-completions request
//! - `response`: chat-completions response → Anthropic response
//! - `streaming`: SSE stream transformations
//! - `tokens`: token counting for `count_tokens`

pub mod anthropic;
pub mod openai;
pub mod request;
pub mod response;
pub mod streaming;
pub mod tokens;

// Re-export commonly used items
pub use anthropic::AnthropicMessagesPayload;
pub use openai::{ChatCompletionResponse, ChatCompletionsPayload};
pub use request::translate_to_openai;
pub use response::translate_to_anthropic;
pub use streaming::{stream_openai_to_anthropic, stream_passthrough};
pub use tokens::{TiktokenCounter, TokenCounter, estimate_input_tokens};
