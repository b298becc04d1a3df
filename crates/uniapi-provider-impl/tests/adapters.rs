use serde_json::Value;

use uniapi_protocol::{ChatCompletionChunk, DONE_FRAME};
use uniapi_provider_impl::LineParser;
use uniapi_provider_impl::providers::{
    azure::AzureParser, claude::ClaudeParser, cloudflare::CloudflareParser, cohere::CohereParser,
    gemini::GeminiParser, openai::OpenAiParser, vertex_claude::VertexClaudeParser,
};

const TS: i64 = 1_720_000_000;

fn chunk_of(frame: &uniapi_provider_core::StreamFrame) -> ChatCompletionChunk {
    let data = frame.as_data().expect("data frame");
    serde_json::from_str(data.trim_start_matches("data: ").trim()).expect("chunk json")
}

#[test]
fn openai_rewrites_id_and_passes_chunks_through() {
    let mut parser = OpenAiParser::new(TS);

    let frames = parser.push_line(r#"data: {"id":"up-1","choices":[{"delta":{"content":"Hi"}}]}"#);
    assert_eq!(frames.len(), 1);
    let data = frames[0].as_data().unwrap();
    assert!(data.starts_with("data: "));
    assert!(data.ends_with("\n\n"));
    let value: Value = serde_json::from_str(data.trim_start_matches("data: ").trim()).unwrap();
    let id = value["id"].as_str().unwrap();
    assert!(id.starts_with("chatcmpl-"));
    assert_eq!(id.len(), "chatcmpl-".len() + 29);
    assert!(id["chatcmpl-".len()..].chars().all(|c| c.is_ascii_alphanumeric()));
    assert_eq!(value["choices"][0]["delta"]["content"], "Hi");

    assert!(!parser.is_done());
    let frames = parser.push_line("data: [DONE]");
    assert_eq!(frames[0].as_data().unwrap(), DONE_FRAME);
    assert!(parser.is_done());
    assert!(parser.finish().is_empty());
}

#[test]
fn openai_id_rewrite_is_stable_across_lines() {
    let mut parser = OpenAiParser::new(TS);
    let a = parser.push_line(r#"data: {"id":"x","choices":[{"delta":{"content":"a"}}]}"#);
    let b = parser.push_line(r#"data: {"id":"y","choices":[{"delta":{"content":"b"}}]}"#);
    let id_of = |frame: &uniapi_provider_core::StreamFrame| {
        let value: Value =
            serde_json::from_str(frame.as_data().unwrap().trim_start_matches("data: ").trim())
                .unwrap();
        value["id"].as_str().unwrap().to_string()
    };
    assert_eq!(id_of(&a[0]), id_of(&b[0]));
}

#[test]
fn openai_non_streaming_shape_becomes_content_delta() {
    let mut parser = OpenAiParser::new(TS);
    let frames = parser.push_line(
        r#"data: {"created":123,"model":"gpt-4o","choices":[{"message":{"content":"full"}}]}"#,
    );
    let chunk = chunk_of(&frames[0]);
    assert_eq!(chunk.object, "chat.completion.chunk");
    assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("full"));
}

#[test]
fn openai_skips_blank_and_comment_lines() {
    let mut parser = OpenAiParser::new(TS);
    assert!(parser.push_line("").is_empty());
    assert!(parser.push_line("data: ").is_empty());
    assert!(parser.push_line(": ping").is_empty());
    // Malformed JSON is logged and skipped; the stream continues.
    assert!(parser.push_line("data: {not json").is_empty());
    assert!(!parser.is_done());
}

#[test]
fn azure_emits_delta_and_short_circuits_on_full_message() {
    let mut parser = AzureParser::new(TS);
    let frames =
        parser.push_line(r#"data: {"model":"gpt-4o","choices":[{"delta":{"content":"Hi"}}]}"#);
    assert_eq!(chunk_of(&frames[0]).choices[0].delta.content.as_deref(), Some("Hi"));

    let frames =
        parser.push_line(r#"data: {"model":"gpt-4o","choices":[{"message":{"content":"done"}}]}"#);
    assert_eq!(frames.len(), 2);
    assert_eq!(chunk_of(&frames[0]).choices[0].delta.content.as_deref(), Some("done"));
    assert_eq!(frames[1].as_data().unwrap(), DONE_FRAME);
    assert!(parser.is_done());
}

#[test]
fn claude_tool_use_sequence() {
    let mut parser = ClaudeParser::new(TS, "claude-3-5-sonnet".to_string());

    let frames =
        parser.push_line(r#"data: {"content_block":{"type":"tool_use","id":"t1","name":"f"}}"#);
    let call_chunk = chunk_of(&frames[0]);
    let call = &call_chunk.choices[0].delta.tool_calls.as_ref().unwrap()[0];
    assert_eq!(call.id.as_deref(), Some("t1"));
    assert_eq!(call.function.name.as_deref(), Some("f"));
    assert_eq!(call.function.arguments.as_deref(), Some(""));

    let frames = parser.push_line(r#"data: {"delta":{"partial_json":"{\"x\":1}"}}"#);
    let args_chunk = chunk_of(&frames[0]);
    let call = &args_chunk.choices[0].delta.tool_calls.as_ref().unwrap()[0];
    assert_eq!(call.id, None);
    assert_eq!(call.function.arguments.as_deref(), Some("{\"x\":1}"));

    let end = parser.finish();
    assert_eq!(end[0].as_data().unwrap(), DONE_FRAME);
}

#[test]
fn claude_role_text_and_usage() {
    let mut parser = ClaudeParser::new(TS, "claude-3-5-sonnet".to_string());

    let frames = parser
        .push_line(r#"data: {"message":{"role":"assistant","usage":{"input_tokens":11}}}"#);
    assert_eq!(chunk_of(&frames[0]).choices[0].delta.role.as_deref(), Some("assistant"));

    let frames = parser.push_line(r#"data: {"delta":{"text":"Hello"}}"#);
    assert_eq!(chunk_of(&frames[0]).choices[0].delta.content.as_deref(), Some("Hello"));

    let frames = parser.push_line(r#"data: {"usage":{"output_tokens":4}}"#);
    let usage_chunk = chunk_of(&frames[0]);
    assert!(usage_chunk.choices.is_empty());
    let usage = usage_chunk.usage.unwrap();
    assert_eq!(usage.prompt_tokens, 11);
    assert_eq!(usage.completion_tokens, 4);
    assert_eq!(usage.total_tokens, 15);

    // Non-data lines (event names, blanks) are ignored.
    assert!(parser.push_line("event: content_block_delta").is_empty());
    assert!(parser.push_line("").is_empty());
}

#[test]
fn gemini_text_lines_and_finish_reason() {
    let mut parser = GeminiParser::new(TS, "gemini-1.5-pro".to_string());

    let frames = parser.push_line(r#"          "text": "hello\\nworld""#);
    assert_eq!(frames.len(), 1);
    let chunk = chunk_of(&frames[0]);
    // The doubly escaped newline arrives as a literal one.
    assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("hello\nworld"));
    assert_eq!(chunk.model, "gemini-1.5-pro");

    assert!(parser.push_line(r#"          "finishReason": "STOP","#).is_empty());
    assert!(parser.is_done());
    let end = parser.finish();
    assert_eq!(end.last().unwrap().as_data().unwrap(), DONE_FRAME);
}

#[test]
fn gemini_function_call_accumulation() {
    let mut parser = GeminiParser::new(TS, "gemini-1.5-pro".to_string());

    assert!(parser.push_line(r#"          "functionCall": {"#).is_empty());
    assert!(parser.push_line(r#"            "name": "get_weather","#).is_empty());
    assert!(parser.push_line(r#"            "args": {"#).is_empty());
    assert!(parser.push_line(r#"              "city": "Paris""#).is_empty());
    assert!(parser.push_line(r#"            }"#).is_empty());
    assert!(parser.push_line(r#"          }"#).is_empty());
    assert!(parser.push_line(r#"        }"#).is_empty());
    assert!(parser.push_line(r#"      ],"#).is_empty());

    let frames = parser.finish();
    assert_eq!(frames.len(), 3);

    let open = chunk_of(&frames[0]);
    let call = &open.choices[0].delta.tool_calls.as_ref().unwrap()[0];
    assert_eq!(call.id.as_deref(), Some("chatcmpl-9inWv0yEtgn873CxMBzHeCeiHctTV"));
    assert_eq!(call.function.name.as_deref(), Some("get_weather"));

    let args = chunk_of(&frames[1]);
    let call = &args.choices[0].delta.tool_calls.as_ref().unwrap()[0];
    let arguments: Value =
        serde_json::from_str(call.function.arguments.as_deref().unwrap()).unwrap();
    assert_eq!(arguments["city"], "Paris");

    assert_eq!(frames[2].as_data().unwrap(), DONE_FRAME);
}

#[test]
fn vertex_claude_tool_use_accumulation() {
    let mut parser = VertexClaudeParser::new(TS, "claude-3-5-sonnet".to_string());

    assert!(parser.push_line(r#"          "type": "tool_use","#).is_empty());
    assert!(parser.push_line(r#"          "id": "toolu_1","#).is_empty());
    assert!(parser.push_line(r#"          "name": "lookup","#).is_empty());
    assert!(parser.push_line(r#"          "input": {"#).is_empty());
    assert!(parser.push_line(r#"            "q": "rust""#).is_empty());
    assert!(parser.push_line(r#"          }"#).is_empty());
    assert!(parser.push_line(r#"        }"#).is_empty());
    assert!(parser.push_line(r#"      ],"#).is_empty());

    let frames = parser.finish();
    let open = chunk_of(&frames[0]);
    let call = &open.choices[0].delta.tool_calls.as_ref().unwrap()[0];
    assert_eq!(call.id.as_deref(), Some("toolu_1"));
    assert_eq!(call.function.name.as_deref(), Some("lookup"));

    let args = chunk_of(&frames[1]);
    let call = &args.choices[0].delta.tool_calls.as_ref().unwrap()[0];
    let arguments: Value =
        serde_json::from_str(call.function.arguments.as_deref().unwrap()).unwrap();
    assert_eq!(arguments["q"], "rust");
}

#[test]
fn cloudflare_response_field_and_done() {
    let mut parser = CloudflareParser::new(TS, "@cf/meta/llama-3".to_string());
    let frames = parser.push_line(r#"data: {"response":"Hi"}"#);
    assert_eq!(chunk_of(&frames[0]).choices[0].delta.content.as_deref(), Some("Hi"));
    assert!(parser.push_line("ignored").is_empty());
    let frames = parser.push_line("data: [DONE]");
    assert_eq!(frames[0].as_data().unwrap(), DONE_FRAME);
    assert!(parser.is_done());
}

#[test]
fn cohere_events_and_termination() {
    let mut parser = CohereParser::new(TS, "command-r".to_string());
    let frames = parser.push_line(r#"{"event_type":"text-generation","text":"Hi"}"#);
    assert_eq!(chunk_of(&frames[0]).choices[0].delta.content.as_deref(), Some("Hi"));
    assert!(parser.push_line(r#"{"event_type":"stream-start"}"#).is_empty());
    let frames = parser.push_line(r#"{"is_finished":true,"event_type":"stream-end"}"#);
    assert_eq!(frames[0].as_data().unwrap(), DONE_FRAME);
    assert!(parser.is_done());
}
