use serde_json::Value;
use tracing::error;

use uniapi_protocol::{ChunkFields, DONE_FRAME, sse_chunk, strip_data_prefix};
use uniapi_provider_core::StreamFrame;

use crate::stream::LineParser;

/// Cloudflare Workers AI stream: `data:`-prefixed JSON lines with the text
/// delta in a `response` field.
pub struct CloudflareParser {
    timestamp: i64,
    model: String,
    done: bool,
}

impl CloudflareParser {
    pub fn new(timestamp: i64, model: String) -> Self {
        Self {
            timestamp,
            model,
            done: false,
        }
    }
}

impl LineParser for CloudflareParser {
    const CONTEXT: &'static str = "fetch_cloudflare_response_stream";

    fn push_line(&mut self, line: &str) -> Vec<StreamFrame> {
        if !line.starts_with("data:") {
            return Vec::new();
        }
        let payload = strip_data_prefix(line);
        if payload == "[DONE]" {
            self.done = true;
            return vec![StreamFrame::Data(DONE_FRAME.to_string())];
        }

        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(err) => {
                error!(event = "upstream_parse_error", context = Self::CONTEXT, line = %line, error = %err);
                return Vec::new();
            }
        };
        match value.get("response").and_then(Value::as_str) {
            Some(message) if !message.is_empty() => vec![StreamFrame::Data(sse_chunk(
                self.timestamp,
                &self.model,
                ChunkFields {
                    content: Some(message),
                    ..ChunkFields::default()
                },
            ))],
            _ => Vec::new(),
        }
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn finish(&mut self) -> Vec<StreamFrame> {
        Vec::new()
    }
}
