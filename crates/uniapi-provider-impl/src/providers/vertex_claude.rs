use serde_json::Value;
use tracing::error;

use uniapi_protocol::{ChunkFields, DONE_FRAME, sse_chunk};
use uniapi_provider_core::StreamFrame;

use crate::stream::LineParser;

/// Claude served through Vertex (`rawPredict` framing): the same line-wise
/// lexical scan as Gemini, with tool accumulation keyed on
/// `"type": "tool_use"` and the id/name/input taken from the buffered block.
pub struct VertexClaudeParser {
    timestamp: i64,
    model: String,
    accumulating: bool,
    tool_buffer: String,
    need_function_call: bool,
}

impl VertexClaudeParser {
    pub fn new(timestamp: i64, model: String) -> Self {
        Self {
            timestamp,
            model,
            accumulating: false,
            tool_buffer: "{".to_string(),
            need_function_call: false,
        }
    }
}

impl LineParser for VertexClaudeParser {
    const CONTEXT: &'static str = "fetch_vertex_claude_response_stream";

    fn push_line(&mut self, line: &str) -> Vec<StreamFrame> {
        if line.is_empty() {
            return Vec::new();
        }

        let mut frames = Vec::new();
        if line.contains("\"text\": \"") {
            match serde_json::from_str::<Value>(&format!("{{{line}}}")) {
                Ok(value) => {
                    let content = value
                        .get("text")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .replace("\\n", "\n");
                    frames.push(StreamFrame::Data(sse_chunk(
                        self.timestamp,
                        &self.model,
                        ChunkFields {
                            content: Some(&content),
                            ..ChunkFields::default()
                        },
                    )));
                }
                Err(err) => {
                    error!(event = "upstream_parse_error", context = Self::CONTEXT, line = %line, error = %err);
                }
            }
        }

        if line.contains("\"type\": \"tool_use\"") || self.accumulating {
            self.accumulating = true;
            self.need_function_call = true;
            if line.contains(']') {
                self.accumulating = false;
                return frames;
            }
            self.tool_buffer.push_str(line);
        }

        frames
    }

    fn is_done(&self) -> bool {
        false
    }

    fn finish(&mut self) -> Vec<StreamFrame> {
        let mut frames = Vec::new();
        if self.need_function_call {
            match serde_json::from_str::<Value>(&self.tool_buffer) {
                Ok(value) => {
                    let id = value
                        .get("id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let name = value
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let arguments = value
                        .get("input")
                        .map(|input| serde_json::to_string(input).unwrap_or_default())
                        .unwrap_or_default();
                    frames.push(StreamFrame::Data(sse_chunk(
                        self.timestamp,
                        &self.model,
                        ChunkFields {
                            tools_id: Some(&id),
                            function_call_name: Some(&name),
                            ..ChunkFields::default()
                        },
                    )));
                    frames.push(StreamFrame::Data(sse_chunk(
                        self.timestamp,
                        &self.model,
                        ChunkFields {
                            function_call_content: Some(&arguments),
                            ..ChunkFields::default()
                        },
                    )));
                }
                Err(err) => {
                    error!(
                        event = "upstream_parse_error",
                        context = Self::CONTEXT,
                        buffer = %self.tool_buffer,
                        error = %err
                    );
                }
            }
        }
        frames.push(StreamFrame::Data(DONE_FRAME.to_string()));
        frames
    }
}
