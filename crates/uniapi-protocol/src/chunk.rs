use rand::distr::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Frame terminator for every outbound SSE line.
pub const END_OF_LINE: &str = "\n\n";

pub const STREAM_FINGERPRINT: &str = "fp_d576307f90";
pub const COMPLETION_FINGERPRINT: &str = "fp_a7d06e42a7";

const CHAT_ID_LEN: usize = 29;

/// Chat id for one request: `chatcmpl-` plus 29 alphanumerics drawn from an
/// RNG seeded with the request timestamp, so every chunk of a request (and a
/// retry at the same second) carries the same id.
pub fn chat_id(timestamp: i64) -> String {
    let rng = StdRng::seed_from_u64(timestamp as u64);
    let suffix: String = rng
        .sample_iter(Alphanumeric)
        .take(CHAT_ID_LEN)
        .map(char::from)
        .collect();
    format!("chatcmpl-{suffix}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<StreamChoice>,
    pub usage: Option<Usage>,
    pub system_fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChoice {
    pub index: i64,
    pub delta: Delta,
    pub logprobs: Option<serde_json::Value>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub function: FunctionDelta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    pub usage: Option<Usage>,
    pub system_fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionChoice {
    pub index: i64,
    pub message: CompletionMessage,
    pub logprobs: Option<serde_json::Value>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: Option<String>,
    pub content: Option<String>,
    pub refusal: Option<serde_json::Value>,
}

/// Optional fields of one normalized event. Exactly one group is usually set;
/// later groups override earlier ones when several are present, in the order
/// content < tool arguments < tool open < role < usage.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkFields<'a> {
    pub content: Option<&'a str>,
    pub tools_id: Option<&'a str>,
    pub function_call_name: Option<&'a str>,
    pub function_call_content: Option<&'a str>,
    pub role: Option<&'a str>,
    /// `(prompt_tokens, completion_tokens)`; the total is always their sum.
    pub usage: Option<(u64, u64)>,
}

/// Build one `data: {...}\n\n` SSE line in the OpenAI chunk format.
pub fn sse_chunk(timestamp: i64, model: &str, fields: ChunkFields<'_>) -> String {
    // An absent or empty content yields an empty delta and a "stop" finish.
    let content = fields.content.filter(|c| !c.is_empty());
    let mut delta = Delta {
        content: content.map(str::to_string),
        ..Delta::default()
    };
    let finish_reason = if content.is_some() {
        None
    } else {
        Some("stop".to_string())
    };

    if let Some(arguments) = fields.function_call_content {
        delta = Delta {
            tool_calls: Some(vec![ToolCallDelta {
                index: 0,
                id: None,
                kind: None,
                function: FunctionDelta {
                    name: None,
                    arguments: Some(arguments.to_string()),
                },
            }]),
            ..Delta::default()
        };
    }
    if let (Some(id), Some(name)) = (fields.tools_id, fields.function_call_name) {
        delta = Delta {
            tool_calls: Some(vec![ToolCallDelta {
                index: 0,
                id: Some(id.to_string()),
                kind: Some("function".to_string()),
                function: FunctionDelta {
                    name: Some(name.to_string()),
                    arguments: Some(String::new()),
                },
            }]),
            ..Delta::default()
        };
    }
    if let Some(role) = fields.role {
        delta = Delta {
            role: Some(role.to_string()),
            content: Some(String::new()),
            tool_calls: None,
        };
    }

    let mut chunk = ChatCompletionChunk {
        id: chat_id(timestamp),
        object: "chat.completion.chunk".to_string(),
        created: timestamp,
        model: model.to_string(),
        choices: vec![StreamChoice {
            index: 0,
            delta,
            logprobs: None,
            finish_reason,
        }],
        usage: None,
        system_fingerprint: STREAM_FINGERPRINT.to_string(),
    };
    if let Some((prompt, completion)) = fields.usage {
        chunk.usage = Some(Usage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        });
        chunk.choices = Vec::new();
    }

    let json = serde_json::to_string(&chunk).unwrap_or_default();
    format!("data: {json}{END_OF_LINE}")
}

/// Build the single JSON object of a non-streaming completion (no `data: `
/// prefix, no terminator).
pub fn completion_json(timestamp: i64, model: &str, fields: ChunkFields<'_>) -> String {
    let mut completion = ChatCompletion {
        id: chat_id(timestamp),
        object: "chat.completion".to_string(),
        created: timestamp,
        model: model.to_string(),
        choices: vec![CompletionChoice {
            index: 0,
            message: CompletionMessage {
                role: fields.role.map(str::to_string),
                content: fields.content.map(str::to_string),
                refusal: None,
            },
            logprobs: None,
            finish_reason: Some("stop".to_string()),
        }],
        usage: None,
        system_fingerprint: COMPLETION_FINGERPRINT.to_string(),
    };
    if let Some((prompt, completion_tokens)) = fields.usage {
        completion.usage = Some(Usage {
            prompt_tokens: prompt,
            completion_tokens: completion_tokens,
            total_tokens: prompt + completion_tokens,
        });
    }
    serde_json::to_string(&completion).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_id_is_deterministic_in_timestamp() {
        let a = chat_id(1_720_000_000);
        let b = chat_id(1_720_000_000);
        let c = chat_id(1_720_000_001);
        assert_eq!(a, b);
        assert_ne!(a, c);
        let suffix = a.strip_prefix("chatcmpl-").expect("chatcmpl- prefix");
        assert_eq!(suffix.len(), 29);
        assert!(suffix.chars().all(|ch| ch.is_ascii_alphanumeric()));
    }

    #[test]
    fn content_chunk_round_trips() {
        let line = sse_chunk(
            1_720_000_000,
            "gpt-4o",
            ChunkFields {
                content: Some("héllo"),
                ..ChunkFields::default()
            },
        );
        assert!(line.starts_with("data: "));
        assert!(line.ends_with("\n\n"));
        // Non-ASCII must survive serialization unescaped.
        assert!(line.contains("héllo"));

        let chunk: ChatCompletionChunk =
            serde_json::from_str(line.trim_start_matches("data: ").trim()).unwrap();
        assert_eq!(chunk.object, "chat.completion.chunk");
        assert_eq!(chunk.model, "gpt-4o");
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("héllo"));
        assert_eq!(chunk.choices[0].finish_reason, None);
        assert_eq!(chunk.usage, None);
    }

    #[test]
    fn role_chunk_shape() {
        let line = sse_chunk(
            1,
            "claude-3-5-sonnet",
            ChunkFields {
                role: Some("assistant"),
                ..ChunkFields::default()
            },
        );
        let chunk: ChatCompletionChunk =
            serde_json::from_str(line.trim_start_matches("data: ").trim()).unwrap();
        let delta = &chunk.choices[0].delta;
        assert_eq!(delta.role.as_deref(), Some("assistant"));
        assert_eq!(delta.content.as_deref(), Some(""));
    }

    #[test]
    fn tool_open_and_arguments_round_trip() {
        let open = sse_chunk(
            1,
            "m",
            ChunkFields {
                tools_id: Some("t1"),
                function_call_name: Some("f"),
                ..ChunkFields::default()
            },
        );
        let chunk: ChatCompletionChunk =
            serde_json::from_str(open.trim_start_matches("data: ").trim()).unwrap();
        let call = &chunk.choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.id.as_deref(), Some("t1"));
        assert_eq!(call.kind.as_deref(), Some("function"));
        assert_eq!(call.function.name.as_deref(), Some("f"));
        assert_eq!(call.function.arguments.as_deref(), Some(""));

        let args = sse_chunk(
            1,
            "m",
            ChunkFields {
                function_call_content: Some("{\"x\":1}"),
                ..ChunkFields::default()
            },
        );
        let chunk: ChatCompletionChunk =
            serde_json::from_str(args.trim_start_matches("data: ").trim()).unwrap();
        let call = &chunk.choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.id, None);
        assert_eq!(call.function.arguments.as_deref(), Some("{\"x\":1}"));
    }

    #[test]
    fn usage_chunk_clears_choices_and_sums_total() {
        let line = sse_chunk(
            1,
            "m",
            ChunkFields {
                usage: Some((3, 4)),
                ..ChunkFields::default()
            },
        );
        let chunk: ChatCompletionChunk =
            serde_json::from_str(line.trim_start_matches("data: ").trim()).unwrap();
        assert!(chunk.choices.is_empty());
        let usage = chunk.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 3);
        assert_eq!(usage.completion_tokens, 4);
        assert_eq!(usage.total_tokens, 7);
    }

    #[test]
    fn completion_json_shape() {
        let json = completion_json(
            1,
            "gemini-1.5-pro",
            ChunkFields {
                content: Some("hi"),
                role: Some("assistant"),
                usage: Some((10, 2)),
                ..ChunkFields::default()
            },
        );
        let completion: ChatCompletion = serde_json::from_str(&json).unwrap();
        assert_eq!(completion.object, "chat.completion");
        assert_eq!(completion.system_fingerprint, COMPLETION_FINGERPRINT);
        let choice = &completion.choices[0];
        assert_eq!(choice.message.role.as_deref(), Some("assistant"));
        assert_eq!(choice.message.content.as_deref(), Some("hi"));
        assert_eq!(choice.finish_reason.as_deref(), Some("stop"));
        assert_eq!(completion.usage.unwrap().total_tokens, 12);
    }
}
