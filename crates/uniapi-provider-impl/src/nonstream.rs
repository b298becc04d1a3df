use serde_json::Value;
use tracing::error;

use uniapi_protocol::{ChunkFields, completion_json, json};
use uniapi_provider_core::{Engine, Headers, StreamFrame};

use crate::stream::{StreamHandle, check_response, post_json};

/// Fetch a complete (non-chunked) upstream response and emit exactly one
/// frame: raw bytes for TTS, an aggregated completion for Gemini, the
/// filtered body for Azure, and the upstream JSON verbatim otherwise.
pub fn fetch_response(
    client: wreq::Client,
    engine: Engine,
    url: String,
    headers: Headers,
    payload: Value,
    model: String,
) -> StreamHandle {
    StreamHandle::spawn(move |tx| async move {
        let response = match post_json(&client, &url, &headers, &payload).await {
            Ok(response) => response,
            Err(body) => {
                let _ = tx.send(StreamFrame::Error(body)).await;
                return;
            }
        };
        let response = match check_response(response, "fetch_response").await {
            Ok(response) => response,
            Err(body) => {
                let _ = tx.send(StreamFrame::Error(body)).await;
                return;
            }
        };
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) => {
                error!(event = "upstream_read_error", context = "fetch_response", error = %err);
                return;
            }
        };

        let frame = match engine {
            Engine::Tts => StreamFrame::Audio(body),
            Engine::Gemini | Engine::VertexGemini => {
                match serde_json::from_slice::<Value>(&body) {
                    Ok(value) => StreamFrame::Data(aggregate_gemini(&value, &model)),
                    Err(err) => {
                        error!(event = "upstream_parse_error", context = "fetch_response", error = %err);
                        StreamFrame::Data(String::from_utf8_lossy(&body).into_owned())
                    }
                }
            }
            Engine::Azure => match serde_json::from_slice::<Value>(&body) {
                Ok(mut value) => {
                    strip_azure_filter_results(&mut value);
                    StreamFrame::Data(value.to_string())
                }
                Err(err) => {
                    error!(event = "upstream_parse_error", context = "fetch_response", error = %err);
                    StreamFrame::Data(String::from_utf8_lossy(&body).into_owned())
                }
            },
            _ => StreamFrame::Data(String::from_utf8_lossy(&body).into_owned()),
        };
        let _ = tx.send(frame).await;
    })
}

/// Gemini non-streaming bodies are arrays of partial event objects: the text
/// parts concatenate in order, usage and role come from the last element.
fn aggregate_gemini(value: &Value, model: &str) -> String {
    let items = match value.as_array() {
        Some(items) => items.as_slice(),
        None => std::slice::from_ref(value),
    };

    let mut content = String::new();
    for item in items {
        if let Some(chunk) = json::str_at(item, "/candidates/0/content/parts/0/text") {
            content.push_str(chunk);
        }
    }

    let last = items.last().unwrap_or(&Value::Null);
    let prompt_tokens = json::u64_at(last, "/usageMetadata/promptTokenCount");
    let completion_tokens = json::u64_at(last, "/usageMetadata/candidatesTokenCount");

    let role = match json::str_at(last, "/candidates/0/content/role") {
        Some("model") => "assistant",
        other => {
            error!(event = "unknown_upstream_role", role = ?other);
            "assistant"
        }
    };

    let timestamp = time::OffsetDateTime::now_utc().unix_timestamp();
    completion_json(
        timestamp,
        model,
        ChunkFields {
            content: Some(&content),
            role: Some(role),
            usage: Some((prompt_tokens, completion_tokens)),
            ..ChunkFields::default()
        },
    )
}

/// Azure attaches moderation verdicts the OpenAI surface does not carry.
fn strip_azure_filter_results(value: &mut Value) {
    if let Some(choices) = value.get_mut("choices").and_then(Value::as_array_mut) {
        for choice in choices {
            if let Some(choice) = choice.as_object_mut() {
                choice.remove("content_filter_results");
            }
        }
    }
    if let Some(root) = value.as_object_mut() {
        root.remove("prompt_filter_results");
    }
}
