//! Chat-completions response → Anthropic Messages response.

use serde_json::Value;

use super::anthropic::{AnthropicResponse, AnthropicUsage, ResponseBlock, StopReason};
use super::openai::{ChatCompletionResponse, ChatContent, ContentPart, ToolCall, Usage};

/// Merge every choice into a single Anthropic message: all text blocks in
/// encounter order, then all tool_use blocks in encounter order.
pub fn translate_to_anthropic(response: &ChatCompletionResponse) -> AnthropicResponse {
    let mut text_blocks = Vec::new();
    let mut tool_blocks = Vec::new();
    let mut finish_reason: Option<&str> = response
        .choices
        .first()
        .and_then(|c| c.finish_reason.as_deref());

    for choice in &response.choices {
        text_blocks.extend(text_blocks_of(choice.message.content.as_ref()));
        tool_blocks.extend(
            choice
                .message
                .tool_calls
                .iter()
                .flatten()
                .map(tool_use_block),
        );

        // tool_calls wins once seen; stop yields to anything
        if choice.finish_reason.as_deref() == Some("tool_calls") || finish_reason == Some("stop") {
            finish_reason = choice.finish_reason.as_deref();
        }
    }

    let mut out = AnthropicResponse::new(response.id.clone(), response.model.clone());
    out.content = text_blocks;
    out.content.extend(tool_blocks);
    out.stop_reason = finish_reason.and_then(map_stop_reason);
    out.usage = response
        .usage
        .as_ref()
        .map(translate_usage)
        .unwrap_or_default();
    out
}

pub fn map_stop_reason(finish_reason: &str) -> Option<StopReason> {
    match finish_reason {
        "stop" => Some(StopReason::EndTurn),
        "length" => Some(StopReason::MaxTokens),
        "tool_calls" => Some(StopReason::ToolUse),
        "content_filter" => Some(StopReason::Refusal),
        _ => None,
    }
}

/// Cached prompt tokens are reported separately and not counted as input.
pub fn translate_usage(usage: &Usage) -> AnthropicUsage {
    let cached = usage.cached_tokens();
    AnthropicUsage {
        input_tokens: usage.prompt_tokens.saturating_sub(cached.unwrap_or(0)),
        output_tokens: usage.completion_tokens,
        cache_read_input_tokens: cached,
    }
}

fn text_blocks_of(content: Option<&ChatContent>) -> Vec<ResponseBlock> {
    match content {
        Some(ChatContent::Text(text)) => vec![ResponseBlock::Text { text: text.clone() }],
        Some(ChatContent::Parts(parts)) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(ResponseBlock::Text { text: text.clone() }),
                _ => None,
            })
            .collect(),
        None => Vec::new(),
    }
}

fn tool_use_block(call: &ToolCall) -> ResponseBlock {
    ResponseBlock::ToolUse {
        id: call.id.clone(),
        name: call.function.name.clone(),
        input: serde_json::from_str(&call.function.arguments)
            .unwrap_or(Value::Object(Default::default())),
    }
}
