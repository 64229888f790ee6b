//! Token counting for `/v1/messages/count_tokens`.
//!
//! Counting is advisory: the estimator never fails, it degrades to a
//! placeholder count and logs the reason.

use tiktoken_rs::CoreBPE;
use tracing::{error, info, warn};

use super::anthropic::AnthropicMessagesPayload;
use super::openai::{ChatCompletionsPayload, ChatContent, ContentPart, Message, MessageRole};
use crate::constants::{MCP_TOOL_PREFIX, PLACEHOLDER_TOKEN_COUNT};
use crate::error::ProxyError;
use crate::models::{BetaFeatures, UpstreamModel};

/// Fixed framing cost of every chat message
const TOKENS_PER_MESSAGE: u64 = 3;
/// Priming for the assistant reply
const TOKENS_PER_REPLY: u64 = 3;
/// Flat cost added per image part on top of its URL
const TOKENS_PER_IMAGE: u64 = 85;
/// Framing cost of each tool declaration
const TOKENS_PER_TOOL: u64 = 7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenCount {
    pub input: u64,
    pub output: u64,
}

/// Raw tokenization of a translated request.
pub trait TokenCounter: Send + Sync {
    fn count(
        &self,
        payload: &ChatCompletionsPayload,
        model: &UpstreamModel,
    ) -> Result<TokenCount, ProxyError>;
}

// ============================================================================
// Tiktoken Counter
// ============================================================================

/// Counts with the BPE named by the model's `capabilities.tokenizer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiktokenCounter;

impl TiktokenCounter {
    /// BPE tables take a while to build; load the common ones at startup.
    pub fn preload() {
        let _ = tiktoken_rs::o200k_base_singleton();
        let _ = tiktoken_rs::cl100k_base_singleton();
    }

    fn bpe_for(tokenizer: &str) -> &'static CoreBPE {
        match tokenizer {
            "cl100k_base" => tiktoken_rs::cl100k_base_singleton(),
            "p50k_base" | "r50k_base" => tiktoken_rs::r50k_base_singleton(),
            _ => tiktoken_rs::o200k_base_singleton(),
        }
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(
        &self,
        payload: &ChatCompletionsPayload,
        model: &UpstreamModel,
    ) -> Result<TokenCount, ProxyError> {
        let bpe = Self::bpe_for(&model.capabilities.tokenizer);
        let encode = |text: &str| bpe.encode_with_special_tokens(text).len() as u64;

        let mut count = TokenCount::default();
        for message in &payload.messages {
            let tokens = message_tokens(message, &encode);
            if message.role == MessageRole::Assistant {
                count.output += tokens;
            } else {
                count.input += tokens;
            }
        }
        if !payload.messages.is_empty() {
            count.input += TOKENS_PER_REPLY;
        }

        for tool in payload.tools.iter().flatten() {
            let definition = serde_json::to_string(&tool.function)
                .map_err(|e| ProxyError::Tokenizer(e.to_string()))?;
            count.input += TOKENS_PER_TOOL + encode(&definition);
        }

        Ok(count)
    }
}

fn message_tokens(message: &Message, encode: &impl Fn(&str) -> u64) -> u64 {
    let role = match message.role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    };
    let mut tokens = TOKENS_PER_MESSAGE + encode(role);

    match &message.content {
        Some(ChatContent::Text(text)) => tokens += encode(text),
        Some(ChatContent::Parts(parts)) => {
            for part in parts {
                tokens += match part {
                    ContentPart::Text { text } => encode(text),
                    ContentPart::ImageUrl { image_url } => {
                        encode(&image_url.url) + TOKENS_PER_IMAGE
                    }
                };
            }
        }
        None => {}
    }

    for call in message.tool_calls.iter().flatten() {
        tokens += encode(&call.id) + encode(&call.function.name) + encode(&call.function.arguments);
    }
    if let Some(id) = &message.tool_call_id {
        tokens += encode(id);
    }
    tokens
}

// ============================================================================
// Vendor Adjustments
// ============================================================================

/// Correction for one vendor family's counting, keyed by model id prefix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VendorAdjustment {
    pub prefix: &'static str,
    /// Added to input when tools are declared (undocumented tool-schema overhead)
    pub tool_surcharge: u64,
    /// Applied to the final total, rounded to nearest
    pub multiplier: f64,
}

pub const VENDOR_ADJUSTMENTS: &[VendorAdjustment] = &[
    VendorAdjustment {
        prefix: "claude",
        tool_surcharge: 346,
        multiplier: 1.15,
    },
    VendorAdjustment {
        prefix: "grok",
        tool_surcharge: 480,
        multiplier: 1.03,
    },
];

impl VendorAdjustment {
    pub fn for_model(model: &str) -> Option<&'static VendorAdjustment> {
        VENDOR_ADJUSTMENTS
            .iter()
            .find(|adj| model.starts_with(adj.prefix))
    }
}

// ============================================================================
// Estimator
// ============================================================================

/// Estimate the Anthropic-side input token count for a request.
///
/// `request` is the inbound payload (its model id picks the vendor
/// family), `translated` its chat-completions form, and `model` the
/// catalog entry for the translated model id. Always returns at least 1.
pub fn estimate_input_tokens(
    counter: &dyn TokenCounter,
    request: &AnthropicMessagesPayload,
    translated: &ChatCompletionsPayload,
    model: Option<&UpstreamModel>,
    beta: &BetaFeatures,
) -> u64 {
    let result = model
        .ok_or_else(|| ProxyError::ModelNotFound(translated.model.clone()))
        .and_then(|model| counter.count(translated, model))
        .map(|raw| adjust(raw, request, beta));

    match result {
        Ok(total) => {
            info!("Token count: {}", total);
            total.max(PLACEHOLDER_TOKEN_COUNT)
        }
        Err(ProxyError::ModelNotFound(id)) => {
            warn!("Model {} not found, returning default token count", id);
            PLACEHOLDER_TOKEN_COUNT
        }
        Err(e) => {
            error!("Error counting tokens: {}", e);
            PLACEHOLDER_TOKEN_COUNT
        }
    }
}

fn adjust(raw: TokenCount, request: &AnthropicMessagesPayload, beta: &BetaFeatures) -> u64 {
    let Some(adjustment) = VendorAdjustment::for_model(&request.model) else {
        return raw.input + raw.output;
    };

    let mut input = raw.input;
    if let Some(tools) = request.tools.as_ref().filter(|t| !t.is_empty()) {
        // Claude Code with MCP tools already accounts for the schema overhead
        let has_mcp_tools =
            beta.is_claude_code() && tools.iter().any(|t| t.name.starts_with(MCP_TOOL_PREFIX));
        if !has_mcp_tools {
            input += adjustment.tool_surcharge;
        }
    }

    ((input + raw.output) as f64 * adjustment.multiplier).round() as u64
}
