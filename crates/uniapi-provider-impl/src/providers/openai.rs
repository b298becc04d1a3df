use serde_json::Value;
use tracing::error;

use uniapi_protocol::{
    ChunkFields, DONE_FRAME, chat_id, data_frame, json, sse_chunk, strip_data_prefix,
};
use uniapi_provider_core::StreamFrame;

use crate::stream::LineParser;

/// OpenAI-compatible chunk stream (`gpt` and `openrouter` engines).
///
/// Chunks pass through mostly untouched: only the `id` field is rewritten to
/// this request's chat id. A non-streaming body smuggled into the stream
/// (`choices[0].message.content`) is re-emitted as a single content delta.
pub struct OpenAiParser {
    timestamp: i64,
    chat_id: String,
    done: bool,
}

impl OpenAiParser {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            chat_id: chat_id(timestamp),
            done: false,
        }
    }
}

impl LineParser for OpenAiParser {
    const CONTEXT: &'static str = "fetch_gpt_response_stream";

    fn push_line(&mut self, line: &str) -> Vec<StreamFrame> {
        if line.is_empty() || line == "data: " || line == "data:" || line.starts_with(": ") {
            return Vec::new();
        }
        let payload = strip_data_prefix(line);
        if payload.trim() == "[DONE]" {
            self.done = true;
            return vec![StreamFrame::Data(DONE_FRAME.to_string())];
        }

        let mut value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(err) => {
                error!(event = "upstream_parse_error", context = Self::CONTEXT, line = %line, error = %err);
                return Vec::new();
            }
        };
        value["id"] = Value::String(self.chat_id.clone());

        if let Some(content) = json::str_at(&value, "/choices/0/message/content")
            .filter(|content| !content.is_empty())
        {
            let created = value
                .get("created")
                .and_then(Value::as_i64)
                .unwrap_or(self.timestamp);
            let model = json::str_at(&value, "/model").unwrap_or_default();
            return vec![StreamFrame::Data(sse_chunk(
                created,
                model,
                ChunkFields {
                    content: Some(content),
                    ..ChunkFields::default()
                },
            ))];
        }

        let json = serde_json::to_string(&value).unwrap_or_default();
        vec![StreamFrame::Data(data_frame(json.trim()))]
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn finish(&mut self) -> Vec<StreamFrame> {
        Vec::new()
    }
}
