//! Anthropic Messages request → chat-completions request.
//!
//! Translation is total: unknown block types are dropped, missing
//! optional fields are omitted, and nothing here returns an error.
//! Callers are expected to have checked `model` and `messages`.

use tracing::debug;

use super::anthropic::{
    AnthropicMessage, AnthropicMessagesPayload, AnthropicTool, AnthropicToolChoice, ContentBlock,
    MessageContent, Role, SystemPrompt, ToolResultContent,
};
use super::openai::{
    CacheControl, ChatCompletionsPayload, ChatContent, ContentPart, FunctionCall,
    FunctionDefinition, ImageUrl, Message, MessageRole, NamedFunction, NamedToolChoice, Snippy,
    Tool, ToolCall, ToolChoice, ToolChoiceMode,
};
use crate::models::{
    BetaFeatures, CapabilityRegistry, ModelCapabilities, ReasoningEffort, VariantSignals,
    VariantTable,
};

/// Separator used whenever several text blocks collapse into one string
const BLOCK_SEPARATOR: &str = "\n\n";

/// Request translator bound to a capability registry and a variant table.
#[derive(Clone, Copy)]
pub struct RequestTranslator<'a> {
    capabilities: &'a CapabilityRegistry,
    variants: &'a VariantTable,
}

impl Default for RequestTranslator<'static> {
    fn default() -> Self {
        Self::new(CapabilityRegistry::shared(), VariantTable::shared())
    }
}

impl<'a> RequestTranslator<'a> {
    pub fn new(capabilities: &'a CapabilityRegistry, variants: &'a VariantTable) -> Self {
        Self {
            capabilities,
            variants,
        }
    }

    /// Resolve the upstream model id for a request (canonical id plus variant suffix).
    pub fn resolve_model(&self, payload: &AnthropicMessagesPayload, beta: &BetaFeatures) -> String {
        let signals = VariantSignals {
            speed: payload.speed.as_deref(),
            beta,
        };
        self.variants.resolve_model(&payload.model, &signals)
    }

    /// Translate an Anthropic payload. `anthropic_beta` is the raw request header.
    pub fn translate(
        &self,
        payload: &AnthropicMessagesPayload,
        anthropic_beta: Option<&str>,
    ) -> ChatCompletionsPayload {
        let beta = BetaFeatures::parse(anthropic_beta);
        let model = self.resolve_model(payload, &beta);
        let caps = self.capabilities.lookup(&model);

        debug!(
            requested = %payload.model,
            resolved = %model,
            cache_control = caps.enable_cache_control,
            thinking_mode = caps.thinking_mode,
            "Translating messages request"
        );

        let mut messages = translate_messages(&payload.messages, payload.system.as_ref());
        let mut tools = payload.tools.as_deref().map(translate_tools);

        if caps.enable_cache_control {
            if let Some(system) = messages.iter_mut().find(|m| m.role == MessageRole::System) {
                system.copilot_cache_control = Some(CacheControl::EPHEMERAL);
            }
            // Single breakpoint on the last tool caches the whole tool list
            if let Some(last) = tools.as_mut().and_then(|t| t.last_mut()) {
                last.copilot_cache_control = Some(CacheControl::EPHEMERAL);
            }
        }

        ChatCompletionsPayload {
            reasoning_effort: reasoning_effort(payload, &caps),
            model,
            messages,
            max_tokens: payload.max_tokens,
            stop: payload.stop_sequences.clone(),
            stream: payload.stream,
            temperature: payload.temperature,
            top_p: payload.top_p,
            user: payload.metadata.as_ref().and_then(|m| m.user_id.clone()),
            tools,
            tool_choice: payload.tool_choice.as_ref().and_then(translate_tool_choice),
            snippy: Snippy { enabled: false },
        }
    }
}

/// An explicit thinking budget always asks for the most effort the chat
/// endpoint accepts. Otherwise models that do not reason natively get
/// their configured default.
fn reasoning_effort(
    payload: &AnthropicMessagesPayload,
    caps: &ModelCapabilities,
) -> Option<ReasoningEffort> {
    let has_budget = payload
        .thinking
        .as_ref()
        .and_then(|t| t.budget_tokens)
        .is_some_and(|b| b > 0);

    if has_budget {
        Some(ReasoningEffort::High)
    } else if !caps.thinking_mode {
        caps.default_reasoning_effort
    } else {
        None
    }
}

fn translate_messages(
    messages: &[AnthropicMessage],
    system: Option<&SystemPrompt>,
) -> Vec<Message> {
    let mut result: Vec<Message> = system_message(system).into_iter().collect();
    for message in messages {
        match message.role {
            Role::User => result.extend(user_messages(&message.content)),
            Role::Assistant => result.push(assistant_message(&message.content)),
        }
    }
    result
}

fn system_message(system: Option<&SystemPrompt>) -> Option<Message> {
    let text = match system? {
        SystemPrompt::Text(text) if text.is_empty() => return None,
        SystemPrompt::Text(text) => text.clone(),
        SystemPrompt::Blocks(blocks) => blocks
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join(BLOCK_SEPARATOR),
    };
    Some(Message::new(MessageRole::System, ChatContent::Text(text)))
}

/// Tool results become `tool` messages placed before the rest of the user
/// turn, keeping the tool_use → tool_result → user order the upstream requires.
fn user_messages(content: &MessageContent) -> Vec<Message> {
    let blocks = match content {
        MessageContent::Text(text) => {
            return vec![Message::new(MessageRole::User, ChatContent::Text(text.clone()))];
        }
        MessageContent::Blocks(blocks) => blocks,
    };

    let (tool_results, others): (Vec<&ContentBlock>, Vec<&ContentBlock>) = blocks
        .iter()
        .partition(|b| matches!(b, ContentBlock::ToolResult { .. }));

    let mut messages: Vec<Message> = tool_results
        .into_iter()
        .filter_map(|block| match block {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
            } => Some(Message {
                tool_call_id: Some(tool_use_id.clone()),
                ..Message::new(MessageRole::Tool, tool_result_content(content))
            }),
            _ => None,
        })
        .collect();

    if !others.is_empty() {
        messages.push(Message::new(MessageRole::User, map_blocks(&others)));
    }
    messages
}

fn tool_result_content(content: &ToolResultContent) -> ChatContent {
    match content {
        ToolResultContent::Text(text) => ChatContent::Text(text.clone()),
        ToolResultContent::Blocks(blocks) => map_blocks(&blocks.iter().collect::<Vec<_>>()),
    }
}

fn assistant_message(content: &MessageContent) -> Message {
    let blocks = match content {
        MessageContent::Text(text) => {
            return Message::new(MessageRole::Assistant, ChatContent::Text(text.clone()));
        }
        MessageContent::Blocks(blocks) => blocks,
    };

    let tool_calls: Vec<ToolCall> = blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                id: id.clone(),
                kind: "function".to_string(),
                function: FunctionCall {
                    name: name.clone(),
                    arguments: serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string()),
                },
            }),
            _ => None,
        })
        .collect();

    if tool_calls.is_empty() {
        let refs: Vec<&ContentBlock> = blocks.iter().collect();
        return Message::new(MessageRole::Assistant, map_blocks(&refs));
    }

    // Chat completions has no thinking blocks: fold them in after the text
    let texts = blocks.iter().filter_map(|b| match b {
        ContentBlock::Text { text } => Some(text.as_str()),
        _ => None,
    });
    let thinking = blocks.iter().filter_map(|b| match b {
        ContentBlock::Thinking { thinking } => Some(thinking.as_str()),
        _ => None,
    });
    let joined = texts.chain(thinking).collect::<Vec<_>>().join(BLOCK_SEPARATOR);

    Message {
        content: (!joined.is_empty()).then_some(ChatContent::Text(joined)),
        tool_calls: Some(tool_calls),
        ..Message::new(MessageRole::Assistant, ChatContent::Text(String::new()))
    }
}

/// Map content blocks to chat content. Without images the blocks collapse
/// to a single string; with images they become typed parts.
fn map_blocks(blocks: &[&ContentBlock]) -> ChatContent {
    let has_image = blocks
        .iter()
        .any(|b| matches!(b, ContentBlock::Image { .. }));

    if !has_image {
        let text = blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Thinking { thinking } => Some(thinking.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(BLOCK_SEPARATOR);
        return ChatContent::Text(text);
    }

    let parts = blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(ContentPart::Text { text: text.clone() }),
            ContentBlock::Thinking { thinking } => Some(ContentPart::Text {
                text: thinking.clone(),
            }),
            ContentBlock::Image { source } => Some(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: source.to_url(),
                },
            }),
            _ => None,
        })
        .collect();
    ChatContent::Parts(parts)
}

fn translate_tools(tools: &[AnthropicTool]) -> Vec<Tool> {
    tools
        .iter()
        .map(|tool| Tool {
            kind: "function",
            function: FunctionDefinition {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.input_schema.clone(),
            },
            copilot_cache_control: None,
        })
        .collect()
}

fn translate_tool_choice(choice: &AnthropicToolChoice) -> Option<ToolChoice> {
    match choice {
        AnthropicToolChoice::Auto => Some(ToolChoice::Mode(ToolChoiceMode::Auto)),
        AnthropicToolChoice::Any => Some(ToolChoice::Mode(ToolChoiceMode::Required)),
        AnthropicToolChoice::Tool { name } => name.as_ref().map(|name| {
            ToolChoice::Function(NamedToolChoice {
                kind: "function",
                function: NamedFunction { name: name.clone() },
            })
        }),
        AnthropicToolChoice::None => Some(ToolChoice::Mode(ToolChoiceMode::None)),
        AnthropicToolChoice::Unknown => None,
    }
}

/// Translate with the built-in capability and variant tables.
pub fn translate_to_openai(
    payload: &AnthropicMessagesPayload,
    anthropic_beta: Option<&str>,
) -> ChatCompletionsPayload {
    RequestTranslator::default().translate(payload, anthropic_beta)
}
