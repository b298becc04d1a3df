use serde_json::Value;
use tracing::error;

use uniapi_protocol::{ChunkFields, DONE_FRAME, sse_chunk};
use uniapi_provider_core::StreamFrame;

use crate::stream::LineParser;

/// Synthetic tool-call id used for Gemini function calls, which carry no id
/// of their own on the wire.
const GEMINI_TOOL_ID: &str = "chatcmpl-9inWv0yEtgn873CxMBzHeCeiHctTV";

/// Gemini / Vertex Gemini stream.
///
/// The upstream body is pretty-printed JSON, one field per line, so this
/// parser scans lexically instead of decoding the document: `"text"` lines
/// are wrapped and decoded individually, and a `"functionCall"` line opens an
/// accumulation window closed by the next line containing `]`.
pub struct GeminiParser {
    timestamp: i64,
    model: String,
    accumulating: bool,
    tool_buffer: String,
    need_function_call: bool,
    done: bool,
}

impl GeminiParser {
    pub fn new(timestamp: i64, model: String) -> Self {
        Self {
            timestamp,
            model,
            accumulating: false,
            tool_buffer: "{".to_string(),
            need_function_call: false,
            done: false,
        }
    }
}

impl LineParser for GeminiParser {
    const CONTEXT: &'static str = "fetch_gemini_response_stream";

    fn push_line(&mut self, line: &str) -> Vec<StreamFrame> {
        if line.is_empty() {
            return Vec::new();
        }
        if line.contains("\"finishReason\": \"") {
            self.done = true;
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
                        // Doubly escaped newlines survive the decode as the
                        // two-character sequence; fold them into real ones.
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

        if line.contains("\"functionCall\": {") || self.accumulating {
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
        self.done
    }

    fn finish(&mut self) -> Vec<StreamFrame> {
        let mut frames = Vec::new();
        if self.need_function_call {
            match serde_json::from_str::<Value>(&self.tool_buffer) {
                Ok(value) => {
                    let name = value
                        .pointer("/functionCall/name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let arguments = value
                        .pointer("/functionCall/args")
                        .map(|args| serde_json::to_string(args).unwrap_or_default())
                        .unwrap_or_default();
                    frames.push(StreamFrame::Data(sse_chunk(
                        self.timestamp,
                        &self.model,
                        ChunkFields {
                            tools_id: Some(GEMINI_TOOL_ID),
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
