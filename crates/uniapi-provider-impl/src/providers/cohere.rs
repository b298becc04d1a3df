use serde_json::Value;
use tracing::error;

use uniapi_protocol::{ChunkFields, DONE_FRAME, sse_chunk};
use uniapi_provider_core::StreamFrame;

use crate::stream::LineParser;

/// Cohere chat stream: each line is a standalone JSON event object.
pub struct CohereParser {
    timestamp: i64,
    model: String,
    done: bool,
}

impl CohereParser {
    pub fn new(timestamp: i64, model: String) -> Self {
        Self {
            timestamp,
            model,
            done: false,
        }
    }
}

impl LineParser for CohereParser {
    const CONTEXT: &'static str = "fetch_cohere_response_stream";

    fn push_line(&mut self, line: &str) -> Vec<StreamFrame> {
        if line.is_empty() {
            return Vec::new();
        }
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => {
                error!(event = "upstream_parse_error", context = Self::CONTEXT, line = %line, error = %err);
                return Vec::new();
            }
        };

        if value.get("is_finished").and_then(Value::as_bool) == Some(true) {
            self.done = true;
            return vec![StreamFrame::Data(DONE_FRAME.to_string())];
        }
        if value.get("event_type").and_then(Value::as_str) == Some("text-generation") {
            return vec![StreamFrame::Data(sse_chunk(
                self.timestamp,
                &self.model,
                ChunkFields {
                    content: value.get("text").and_then(Value::as_str),
                    ..ChunkFields::default()
                },
            ))];
        }
        Vec::new()
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn finish(&mut self) -> Vec<StreamFrame> {
        Vec::new()
    }
}
