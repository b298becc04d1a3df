use serde_json::Value;
use tracing::error;

use uniapi_protocol::{ChunkFields, DONE_FRAME, json, sse_chunk, strip_data_prefix};
use uniapi_provider_core::StreamFrame;

use crate::stream::LineParser;

/// Azure OpenAI stream. Same line framing as OpenAI, but only the content
/// delta is forwarded; a non-streaming `message.content` body short-circuits
/// the stream with its content followed by `[DONE]`.
pub struct AzureParser {
    timestamp: i64,
    emitted: bool,
    done: bool,
}

impl AzureParser {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            emitted: false,
            done: false,
        }
    }
}

impl LineParser for AzureParser {
    const CONTEXT: &'static str = "fetch_azure_response_stream";

    fn push_line(&mut self, line: &str) -> Vec<StreamFrame> {
        if line.is_empty() || line == "data: " || line == "data:" || line.starts_with(": ") {
            return Vec::new();
        }
        let payload = strip_data_prefix(line);
        if payload.trim() == "[DONE]" {
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
        let message_content = json::str_at(&value, "/choices/0/message/content");
        let delta_content = json::str_at(&value, "/choices/0/delta/content");

        let mut frames = Vec::new();
        if message_content.is_some() || delta_content.is_some() || self.emitted {
            self.emitted = true;
            let model = json::str_at(&value, "/model").unwrap_or_default();
            frames.push(StreamFrame::Data(sse_chunk(
                self.timestamp,
                model,
                ChunkFields {
                    content: message_content.or(delta_content),
                    ..ChunkFields::default()
                },
            )));
        }
        if message_content.is_some() {
            self.done = true;
            frames.push(StreamFrame::Data(DONE_FRAME.to_string()));
        }
        frames
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn finish(&mut self) -> Vec<StreamFrame> {
        Vec::new()
    }
}
