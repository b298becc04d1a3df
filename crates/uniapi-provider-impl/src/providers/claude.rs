use serde_json::Value;
use tracing::error;

use uniapi_protocol::{ChunkFields, DONE_FRAME, sse_chunk, strip_data_prefix};
use uniapi_provider_core::StreamFrame;

use crate::stream::LineParser;

/// Claude messages stream. Dispatches on the fields of each `data:` event:
/// role announcement, usage accounting, tool-use open, text delta and
/// partial-JSON tool arguments.
pub struct ClaudeParser {
    timestamp: i64,
    model: String,
    input_tokens: u64,
}

impl ClaudeParser {
    pub fn new(timestamp: i64, model: String) -> Self {
        Self {
            timestamp,
            model,
            input_tokens: 0,
        }
    }

    fn chunk(&self, fields: ChunkFields<'_>) -> StreamFrame {
        StreamFrame::Data(sse_chunk(self.timestamp, &self.model, fields))
    }
}

impl LineParser for ClaudeParser {
    const CONTEXT: &'static str = "fetch_claude_response_stream";

    fn push_line(&mut self, line: &str) -> Vec<StreamFrame> {
        if !line.starts_with("data:") {
            return Vec::new();
        }
        let payload = strip_data_prefix(line);
        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(err) => {
                error!(event = "upstream_parse_error", context = Self::CONTEXT, line = %line, error = %err);
                return Vec::new();
            }
        };

        let mut frames = Vec::new();

        if let Some(message) = value.get("message") {
            if let Some(role) = message.get("role").and_then(Value::as_str) {
                frames.push(self.chunk(ChunkFields {
                    role: Some(role),
                    ..ChunkFields::default()
                }));
            }
            if let Some(usage) = message.get("usage") {
                self.input_tokens = usage
                    .get("input_tokens")
                    .and_then(Value::as_u64)
                    .unwrap_or_default();
            }
        }

        if let Some(usage) = value.get("usage") {
            let output_tokens = usage
                .get("output_tokens")
                .and_then(Value::as_u64)
                .unwrap_or_default();
            frames.push(self.chunk(ChunkFields {
                usage: Some((self.input_tokens, output_tokens)),
                ..ChunkFields::default()
            }));
        }

        if let Some(block) = value.get("content_block")
            && block.get("type").and_then(Value::as_str) == Some("tool_use")
            && let Some(id) = block.get("id").and_then(Value::as_str)
            && let Some(name) = block.get("name").and_then(Value::as_str)
        {
            frames.push(self.chunk(ChunkFields {
                tools_id: Some(id),
                function_call_name: Some(name),
                ..ChunkFields::default()
            }));
        }

        if let Some(delta) = value.get("delta") {
            if let Some(text) = delta.get("text").and_then(Value::as_str) {
                frames.push(self.chunk(ChunkFields {
                    content: Some(text),
                    ..ChunkFields::default()
                }));
            }
            if let Some(partial) = delta.get("partial_json").and_then(Value::as_str) {
                frames.push(self.chunk(ChunkFields {
                    function_call_content: Some(partial),
                    ..ChunkFields::default()
                }));
            }
        }

        frames
    }

    fn is_done(&self) -> bool {
        false
    }

    fn finish(&mut self) -> Vec<StreamFrame> {
        vec![StreamFrame::Data(DONE_FRAME.to_string())]
    }
}
