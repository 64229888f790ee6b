//! SSE stream transformations.
//!
//! This module provides:
//! - `StreamTranslator`: per-stream state machine turning chat-completion
//!   chunks into Anthropic stream events
//! - `stream_openai_to_anthropic`: upstream SSE body → Anthropic SSE body
//! - `stream_passthrough`: forwards an upstream SSE body unchanged
//!
//! Both stream functions include keep-alive pings to prevent connection
//! timeouts during long-running requests (e.g., reasoning models).

use async_stream::stream;
use bytes::Bytes;
use futures_util::Stream;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, warn};

use super::anthropic::{
    AnthropicResponse, AnthropicStreamEvent, AnthropicUsage, BlockDelta, MessageDeltaBody,
    ResponseBlock,
};
use super::openai::{ChatCompletionChunk, ToolCallDelta};
use super::response::{map_stop_reason, translate_usage};

/// Keep-alive interval for SSE streams (prevents proxy/load balancer timeouts).
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// SSE keep-alive comment (ignored by clients but keeps connection alive).
const KEEP_ALIVE_COMMENT: &str = ": keep-alive\n\n";

// ============================================================================
// Chunk Translation
// ============================================================================

#[derive(Debug, Clone)]
struct OpenToolCall {
    block_index: usize,
}

/// Translation state for one streamed response.
#[derive(Debug, Default)]
pub struct StreamTranslator {
    message_started: bool,
    block_index: usize,
    block_open: bool,
    /// Upstream tool-call index → the Anthropic block it streams into
    tool_calls: HashMap<usize, OpenToolCall>,
}

impl StreamTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn translate_chunk(&mut self, chunk: &ChatCompletionChunk) -> Vec<AnthropicStreamEvent> {
        let Some(choice) = chunk.choices.first() else {
            return Vec::new();
        };
        let mut events = Vec::new();

        if !self.message_started {
            let mut message = AnthropicResponse::new(chunk.id.clone(), chunk.model.clone());
            if let Some(usage) = &chunk.usage {
                message.usage = AnthropicUsage {
                    output_tokens: 0,
                    ..translate_usage(usage)
                };
            }
            events.push(AnthropicStreamEvent::MessageStart { message });
            self.message_started = true;
        }

        if let Some(text) = choice.delta.content.as_deref().filter(|t| !t.is_empty()) {
            if self.tool_block_open() {
                self.close_block(&mut events);
            }
            if !self.block_open {
                events.push(AnthropicStreamEvent::ContentBlockStart {
                    index: self.block_index,
                    content_block: ResponseBlock::Text {
                        text: String::new(),
                    },
                });
                self.block_open = true;
            }
            events.push(AnthropicStreamEvent::ContentBlockDelta {
                index: self.block_index,
                delta: BlockDelta::TextDelta {
                    text: text.to_string(),
                },
            });
        }

        for call in choice.delta.tool_calls.iter().flatten() {
            self.translate_tool_call(call, &mut events);
        }

        if let Some(reason) = &choice.finish_reason {
            if self.block_open {
                events.push(AnthropicStreamEvent::ContentBlockStop {
                    index: self.block_index,
                });
                self.block_open = false;
            }
            events.push(AnthropicStreamEvent::MessageDelta {
                delta: MessageDeltaBody {
                    stop_reason: map_stop_reason(reason),
                    stop_sequence: None,
                },
                usage: chunk.usage.as_ref().map(translate_usage).unwrap_or_default(),
            });
            events.push(AnthropicStreamEvent::MessageStop);
        }

        events
    }

    fn translate_tool_call(
        &mut self,
        call: &ToolCallDelta,
        events: &mut Vec<AnthropicStreamEvent>,
    ) {
        let function = call.function.as_ref();

        if let (Some(id), Some(name)) = (&call.id, function.and_then(|f| f.name.as_ref())) {
            if self.block_open {
                self.close_block(events);
            }
            self.tool_calls.insert(
                call.index,
                OpenToolCall {
                    block_index: self.block_index,
                },
            );
            events.push(AnthropicStreamEvent::ContentBlockStart {
                index: self.block_index,
                content_block: ResponseBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: serde_json::Value::Object(Default::default()),
                },
            });
            self.block_open = true;
        }

        if let Some(arguments) = function
            .and_then(|f| f.arguments.as_ref())
            .filter(|a| !a.is_empty())
        {
            // Fragments for a call we never saw start are dropped
            if let Some(open) = self.tool_calls.get(&call.index) {
                events.push(AnthropicStreamEvent::ContentBlockDelta {
                    index: open.block_index,
                    delta: BlockDelta::InputJsonDelta {
                        partial_json: arguments.clone(),
                    },
                });
            }
        }
    }

    fn tool_block_open(&self) -> bool {
        self.block_open
            && self
                .tool_calls
                .values()
                .any(|c| c.block_index == self.block_index)
    }

    fn close_block(&mut self, events: &mut Vec<AnthropicStreamEvent>) {
        events.push(AnthropicStreamEvent::ContentBlockStop {
            index: self.block_index,
        });
        self.block_index += 1;
        self.block_open = false;
    }
}

// ============================================================================
// Stream Transformations
// ============================================================================

/// Outcome of feeding one SSE line to the translator.
#[derive(Debug, PartialEq, Eq)]
enum LineOutcome {
    Continue,
    Done,
}

/// Translate a single upstream SSE line, appending Anthropic frames to `output`.
fn translate_sse_line(
    raw: &[u8],
    translator: &mut StreamTranslator,
    output: &mut String,
) -> LineOutcome {
    let line = String::from_utf8_lossy(raw);
    let Some(data) = line.trim().strip_prefix("data:").map(str::trim) else {
        return LineOutcome::Continue;
    };

    if data == "[DONE]" {
        return LineOutcome::Done;
    }

    match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) => {
            for event in translator.translate_chunk(&chunk) {
                output.push_str(&event.to_sse());
            }
        }
        Err(e) => warn!("Skipping unparseable stream chunk: {}", e),
    }
    LineOutcome::Continue
}

/// Transform an upstream chat-completions SSE stream into Anthropic SSE.
///
/// Chunks are translated and forwarded strictly in arrival order. Lines are
/// split on raw bytes so characters straddling network chunks survive.
/// Includes keep-alive pings every 15 seconds to prevent connection timeouts.
pub fn stream_openai_to_anthropic(
    body: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send {
    stream! {
        use futures_util::StreamExt;

        let mut buffer: Vec<u8> = Vec::new();
        let mut translator = StreamTranslator::new();

        let mut body = std::pin::pin!(body);
        let mut keep_alive = interval(KEEP_ALIVE_INTERVAL);
        keep_alive.reset(); // Don't fire immediately

        'outer: loop {
            tokio::select! {
                biased; // Prefer data over keep-alive when both ready

                chunk_opt = body.next() => {
                    let Some(chunk_result) = chunk_opt else {
                        // Upstream closed without [DONE]; flush an unterminated last line
                        let mut output = String::new();
                        if !buffer.is_empty() {
                            translate_sse_line(&buffer, &mut translator, &mut output);
                        }
                        if !output.is_empty() {
                            yield Ok(Bytes::from(output));
                        }
                        break;
                    };

                    let chunk = match chunk_result {
                        Ok(c) => c,
                        Err(e) => {
                            yield Err(std::io::Error::other(e));
                            return;
                        }
                    };

                    buffer.extend_from_slice(&chunk);

                    let mut output = String::new();
                    while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                        let line: Vec<u8> = buffer.drain(..=newline_pos).collect();

                        let outcome = translate_sse_line(&line, &mut translator, &mut output);
                        if outcome == LineOutcome::Done {
                            if !output.is_empty() {
                                yield Ok(Bytes::from(output));
                            }
                            break 'outer;
                        }
                    }

                    if !output.is_empty() {
                        yield Ok(Bytes::from(output));
                    }
                }

                _ = keep_alive.tick() => {
                    yield Ok(Bytes::from(KEEP_ALIVE_COMMENT));
                }
            }
        }

        debug!("Upstream stream finished");
    }
}

/// Forward an upstream SSE stream unchanged, adding keep-alive pings.
pub fn stream_passthrough(
    body: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send {
    use futures_util::StreamExt;

    stream! {
        let mut body = std::pin::pin!(body);
        let mut keep_alive = interval(KEEP_ALIVE_INTERVAL);
        keep_alive.reset(); // Don't fire immediately

        loop {
            tokio::select! {
                biased;

                chunk_opt = body.next() => {
                    match chunk_opt {
                        Some(Ok(chunk)) => yield Ok(chunk),
                        Some(Err(e)) => {
                            yield Err(std::io::Error::other(e));
                            return;
                        }
                        None => break,
                    }
                }

                _ = keep_alive.tick() => {
                    yield Ok(Bytes::from(KEEP_ALIVE_COMMENT));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::anthropic::StopReason;
    use futures_util::StreamExt;
    use serde_json::{Value, json};

    fn chunk(value: Value) -> ChatCompletionChunk {
        serde_json::from_value(value).unwrap()
    }

    fn delta(delta: Value, finish_reason: Value) -> ChatCompletionChunk {
        chunk(json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o",
            "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}]
        }))
    }

    fn names(events: &[AnthropicStreamEvent]) -> Vec<&'static str> {
        events.iter().map(|e| e.event_name()).collect()
    }

    #[test]
    fn test_text_stream() {
        let mut t = StreamTranslator::new();

        let first = t.translate_chunk(&delta(json!({"role": "assistant", "content": "Hel"}), Value::Null));
        assert_eq!(
            names(&first),
            vec!["message_start", "content_block_start", "content_block_delta"]
        );

        let second = t.translate_chunk(&delta(json!({"content": "lo"}), Value::Null));
        assert_eq!(names(&second), vec!["content_block_delta"]);
        assert!(matches!(
            &second[0],
            AnthropicStreamEvent::ContentBlockDelta { index: 0, delta: BlockDelta::TextDelta { text } } if text == "lo"
        ));

        let last = t.translate_chunk(&delta(json!({}), json!("stop")));
        assert_eq!(
            names(&last),
            vec!["content_block_stop", "message_delta", "message_stop"]
        );
        assert!(matches!(
            &last[1],
            AnthropicStreamEvent::MessageDelta { delta: MessageDeltaBody { stop_reason: Some(StopReason::EndTurn), .. }, .. }
        ));
    }

    #[test]
    fn test_text_then_tool_calls() {
        let mut t = StreamTranslator::new();
        t.translate_chunk(&delta(json!({"content": "Checking."}), Value::Null));

        let start = t.translate_chunk(&delta(
            json!({"tool_calls": [{"index": 0, "id": "call_1", "type": "function", "function": {"name": "get_weather", "arguments": ""}}]}),
            Value::Null,
        ));
        assert_eq!(names(&start), vec!["content_block_stop", "content_block_start"]);
        assert!(matches!(&start[0], AnthropicStreamEvent::ContentBlockStop { index: 0 }));
        assert!(matches!(
            &start[1],
            AnthropicStreamEvent::ContentBlockStart { index: 1, content_block: ResponseBlock::ToolUse { name, .. } } if name == "get_weather"
        ));

        let args = t.translate_chunk(&delta(
            json!({"tool_calls": [{"index": 0, "function": {"arguments": "{\"city\":"}}]}),
            Value::Null,
        ));
        assert!(matches!(
            &args[0],
            AnthropicStreamEvent::ContentBlockDelta { index: 1, delta: BlockDelta::InputJsonDelta { partial_json } } if partial_json == "{\"city\":"
        ));

        // Second parallel call opens block 2; late fragments of call 0 still target block 1
        let second = t.translate_chunk(&delta(
            json!({"tool_calls": [{"index": 1, "id": "call_2", "function": {"name": "get_time", "arguments": "{}"}}]}),
            Value::Null,
        ));
        assert_eq!(
            names(&second),
            vec!["content_block_stop", "content_block_start", "content_block_delta"]
        );
        assert!(matches!(&second[2], AnthropicStreamEvent::ContentBlockDelta { index: 2, .. }));

        let late = t.translate_chunk(&delta(
            json!({"tool_calls": [{"index": 0, "function": {"arguments": "\"Oslo\"}"}}]}),
            Value::Null,
        ));
        assert!(matches!(&late[0], AnthropicStreamEvent::ContentBlockDelta { index: 1, .. }));

        let end = t.translate_chunk(&delta(json!({}), json!("tool_calls")));
        assert!(matches!(&end[0], AnthropicStreamEvent::ContentBlockStop { index: 2 }));
        assert!(matches!(
            &end[1],
            AnthropicStreamEvent::MessageDelta { delta: MessageDeltaBody { stop_reason: Some(StopReason::ToolUse), .. }, .. }
        ));
    }

    #[test]
    fn test_text_after_tool_call_opens_new_block() {
        let mut t = StreamTranslator::new();
        t.translate_chunk(&delta(
            json!({"tool_calls": [{"index": 0, "id": "call_1", "function": {"name": "run"}}]}),
            Value::Null,
        ));
        let events = t.translate_chunk(&delta(json!({"content": "done"}), Value::Null));
        assert_eq!(
            names(&events),
            vec!["content_block_stop", "content_block_start", "content_block_delta"]
        );
        assert!(matches!(&events[1], AnthropicStreamEvent::ContentBlockStart { index: 1, .. }));
    }

    #[test]
    fn test_empty_choices_emit_nothing() {
        let mut t = StreamTranslator::new();
        let events = t.translate_chunk(&chunk(json!({
            "id": "x",
            "model": "gpt-4o",
            "choices": [],
            "usage": {"prompt_tokens": 5, "completion_tokens": 1}
        })));
        assert!(events.is_empty());
    }

    #[test]
    fn test_usage_in_start_and_delta() {
        let mut t = StreamTranslator::new();
        let usage = json!({"prompt_tokens": 100, "completion_tokens": 7, "prompt_tokens_details": {"cached_tokens": 30}});
        let first = t.translate_chunk(&chunk(json!({
            "id": "msg",
            "model": "claude-sonnet-4",
            "choices": [{"index": 0, "delta": {"content": "hi"}, "finish_reason": "stop"}],
            "usage": usage
        })));
        let start = serde_json::to_value(&first[0]).unwrap();
        assert_eq!(start["message"]["usage"], json!({"input_tokens": 70, "output_tokens": 0, "cache_read_input_tokens": 30}));
        assert_eq!(start["message"]["content"], json!([]));

        let message_delta = serde_json::to_value(&first[4]).unwrap();
        assert_eq!(message_delta["type"], "message_delta");
        assert_eq!(message_delta["delta"]["stop_reason"], "end_turn");
        assert_eq!(
            message_delta["usage"],
            json!({"input_tokens": 70, "output_tokens": 7, "cache_read_input_tokens": 30})
        );
    }

    fn body(parts: &[&str]) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static {
        let owned: Vec<Result<Bytes, reqwest::Error>> =
            parts.iter().map(|p| Ok(Bytes::from(p.to_string()))).collect();
        futures_util::stream::iter(owned)
    }

    #[tokio::test]
    async fn test_sse_adapter_handles_split_lines() {
        let first = r#"data: {"id":"c1","model":"gpt-4o","choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}"#;
        let last = r#"data: {"id":"c1","model":"gpt-4o","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#;
        let (a, b) = first.split_at(30);
        let stream = stream_openai_to_anthropic(body(&[
            a,
            &format!("{b}\n\n"),
            ": comment\n\n",
            &format!("{last}\n\ndata: [DONE]\n\n"),
        ]));
        let out: Vec<String> = stream
            .map(|r| String::from_utf8(r.unwrap().to_vec()).unwrap())
            .collect()
            .await;
        let joined = out.concat();

        let events: Vec<&str> = joined
            .lines()
            .filter_map(|l| l.strip_prefix("event: "))
            .collect();
        assert_eq!(
            events,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop"
            ]
        );
        assert!(joined.contains(r#""text":"Hi""#));
    }

    fn byte_body(
        parts: Vec<Vec<u8>>,
    ) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static {
        futures_util::stream::iter(parts.into_iter().map(|p| Ok(Bytes::from(p))))
    }

    async fn collect_text(stream: impl Stream<Item = Result<Bytes, std::io::Error>>) -> String {
        let out: Vec<Bytes> = stream.map(|r| r.unwrap()).collect().await;
        String::from_utf8(out.concat()).unwrap()
    }

    #[tokio::test]
    async fn test_sse_adapter_keeps_multibyte_char_split_across_chunks() {
        let raw = concat!(
            r#"data: {"id":"c1","model":"gpt-4o","choices":[{"index":0,"delta":{"content":"café ok"},"finish_reason":null}]}"#,
            "\n\n",
            r#"data: {"id":"c1","model":"gpt-4o","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
            "\n\ndata: [DONE]\n\n",
        )
        .as_bytes();
        // Split between the two bytes of 'é'
        let split = raw.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let parts = vec![raw[..split].to_vec(), raw[split..].to_vec()];

        let joined = collect_text(stream_openai_to_anthropic(byte_body(parts))).await;

        assert!(joined.contains(r#""text":"café ok""#));
        assert!(joined.contains("event: message_start"));
        assert!(joined.contains("event: message_stop"));
    }

    #[tokio::test]
    async fn test_sse_adapter_flushes_unterminated_last_line() {
        let first = r#"data: {"id":"c1","model":"gpt-4o","choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}"#;
        let last = r#"data: {"id":"c1","model":"gpt-4o","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#;
        let upstream = body(&[&format!("{first}\n\n"), last]);
        let joined = collect_text(stream_openai_to_anthropic(upstream)).await;

        assert!(joined.contains("event: message_delta"));
        assert!(joined.contains("event: message_stop"));
    }

    #[tokio::test]
    async fn test_passthrough_is_verbatim() {
        let stream = stream_passthrough(body(&["data: {\"a\":1}\n\n", "data: [DONE]\n\n"]));
        let out: Vec<Bytes> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(out.concat(), b"data: {\"a\":1}\n\ndata: [DONE]\n\n".to_vec());
    }
}
