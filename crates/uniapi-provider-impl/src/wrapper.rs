use std::time::{Duration, Instant};

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error};

use uniapi_protocol::strip_data_prefix;
use uniapi_provider_core::{Engine, GatewayError, StreamFrame};

use crate::audio;
use crate::stream::StreamHandle;

const DETAIL_LIMIT: usize = 300;

/// Result of wrapping a stream: the stream itself (first frame re-queued) and
/// the measured time to first byte.
#[derive(Debug)]
pub struct FirstChunk {
    pub stream: StreamHandle,
    pub ttfb: Duration,
}

enum Inspected {
    /// Known audio container: pass every remaining frame through untouched.
    Audio(Bytes),
    Frame(StreamFrame),
}

/// Pull the first frame off `stream`, classify it, and either fail the whole
/// exchange (nothing has reached the client yet) or hand back a stream that
/// replays the frame and forwards the rest.
///
/// Heartbeat frames are forwarded as-is; inspection then applies to the first
/// non-heartbeat frame, at which point the response has already started, so a
/// failed inspection simply ends the stream.
pub async fn error_handling_wrapper(
    mut stream: StreamHandle,
    channel_id: &str,
    engine: Engine,
    is_stream: bool,
    error_triggers: &[String],
) -> Result<FirstChunk, GatewayError> {
    let started = Instant::now();
    let Some(first) = stream.recv().await else {
        error!(event = "empty_upstream_stream", provider = %channel_id);
        return Err(GatewayError::NoData);
    };
    let ttfb = started.elapsed();

    if is_heartbeat(&first) {
        let channel_id = channel_id.to_string();
        let triggers = error_triggers.to_vec();
        let wrapped = StreamHandle::spawn(move |tx| async move {
            if tx.send(first).await.is_err() {
                stream.close().await;
                return;
            }
            let mut inspected = false;
            while let Some(frame) = stream.recv().await {
                let frame = if !inspected && !is_heartbeat(&frame) {
                    inspected = true;
                    match inspect_first(frame, &channel_id, engine, is_stream, &triggers) {
                        Ok(Inspected::Audio(bytes)) => StreamFrame::Audio(bytes),
                        Ok(Inspected::Frame(frame)) => frame,
                        Err(err) => {
                            error!(event = "first_chunk_error", provider = %channel_id, error = %err);
                            break;
                        }
                    }
                } else {
                    frame
                };
                if tx.send(frame).await.is_err() {
                    debug!(event = "stream_cancelled", provider = %channel_id);
                    break;
                }
            }
            stream.close().await;
        });
        return Ok(FirstChunk { stream: wrapped, ttfb });
    }

    match inspect_first(first, channel_id, engine, is_stream, error_triggers)? {
        Inspected::Audio(bytes) => {
            let channel_id = channel_id.to_string();
            let wrapped = StreamHandle::spawn(move |tx| async move {
                if tx.send(StreamFrame::Audio(bytes)).await.is_ok() {
                    forward_rest(&mut stream, &tx, &channel_id).await;
                }
                stream.close().await;
            });
            Ok(FirstChunk { stream: wrapped, ttfb })
        }
        Inspected::Frame(frame) => {
            let channel_id = channel_id.to_string();
            let wrapped = StreamHandle::spawn(move |tx| async move {
                if tx.send(frame).await.is_ok() {
                    forward_rest(&mut stream, &tx, &channel_id).await;
                }
                stream.close().await;
            });
            Ok(FirstChunk { stream: wrapped, ttfb })
        }
    }
}

async fn forward_rest(
    stream: &mut StreamHandle,
    tx: &mpsc::Sender<StreamFrame>,
    channel_id: &str,
) {
    while let Some(frame) = stream.recv().await {
        if tx.send(frame).await.is_err() {
            // Client disconnects are normal termination.
            debug!(event = "stream_cancelled", provider = %channel_id);
            return;
        }
    }
}

fn is_heartbeat(frame: &StreamFrame) -> bool {
    frame
        .as_data()
        .is_some_and(|data| data.starts_with(": uni-api-heartbeat"))
}

fn inspect_first(
    frame: StreamFrame,
    channel_id: &str,
    engine: Engine,
    is_stream: bool,
    error_triggers: &[String],
) -> Result<Inspected, GatewayError> {
    match frame {
        StreamFrame::Audio(bytes) => {
            if audio::identify(&bytes).is_some() {
                return Ok(Inspected::Audio(bytes));
            }
            let text = String::from_utf8_lossy(&bytes).into_owned();
            inspect_text(&text, channel_id, engine, is_stream, error_triggers)?;
            Ok(Inspected::Frame(StreamFrame::Data(text)))
        }
        StreamFrame::Error(body) => {
            error!(
                event = "upstream_error_body",
                provider = %channel_id,
                status = body.status_code,
            );
            Err(GatewayError::UpstreamHttp {
                status: body.status_code,
                details: truncate_detail(&body.details),
            })
        }
        StreamFrame::Data(text) => {
            inspect_text(&text, channel_id, engine, is_stream, error_triggers)?;
            Ok(Inspected::Frame(StreamFrame::Data(text)))
        }
    }
}

fn inspect_text(
    text: &str,
    channel_id: &str,
    engine: Engine,
    is_stream: bool,
    error_triggers: &[String],
) -> Result<(), GatewayError> {
    let content = if text.starts_with("data:") {
        strip_data_prefix(text)
    } else {
        text
    };
    if content.starts_with("[DONE]") {
        error!(event = "first_chunk_done", provider = %channel_id);
        return Err(GatewayError::NoData);
    }

    let unescaped = unicode_unescape(content);
    if error_triggers.iter().any(|trigger| unescaped.contains(trigger.as_str())) {
        error!(event = "error_trigger_matched", provider = %channel_id, content = %unescaped);
        return Err(GatewayError::UpstreamContent);
    }

    let value: Value = match serde_json::from_str(content.trim()) {
        Ok(value) => value,
        Err(_) => {
            if content.contains("uni-api-heartbeat") {
                return Ok(());
            }
            error!(event = "first_chunk_not_json", provider = %channel_id, content = %content);
            return Err(GatewayError::NoData);
        }
    };

    if let Some(err_field) = value.get("error")
        && !error_field_is_empty(err_field)
    {
        let status = value
            .get("status_code")
            .and_then(Value::as_u64)
            .unwrap_or(500) as u16;
        let details = value
            .get("details")
            .cloned()
            .unwrap_or_else(|| value.clone());
        return Err(GatewayError::UpstreamHttp {
            status,
            details: truncate_detail(&details),
        });
    }

    if !is_stream && !engine.is_media() {
        let serialized = value.to_string();
        if error_triggers.iter().any(|trigger| serialized.contains(trigger.as_str())) {
            error!(event = "error_trigger_matched", provider = %channel_id, content = %serialized);
            return Err(GatewayError::UpstreamContent);
        }
        let message = value
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str);
        if message.is_none_or(str::is_empty) {
            return Err(GatewayError::EmptyCompletion);
        }
    }

    Ok(())
}

fn error_field_is_empty(error: &Value) -> bool {
    match error {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        // Exactly the "no error" template some providers send along; any
        // other key set or value is a real error.
        Value::Object(_) => {
            *error
                == serde_json::json!({"message": "", "type": "", "param": "", "code": null})
        }
        _ => false,
    }
}

fn truncate_detail(details: &Value) -> String {
    let text = match details {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    text.chars().take(DETAIL_LIMIT).collect()
}

/// Best-effort decode of backslash escapes (`\n`, `\t`, `\uXXXX`, ...) so
/// trigger substrings match against the text a client would render.
/// Unrecognized escapes are kept verbatim.
fn unicode_unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.peek() {
            Some('n') => {
                chars.next();
                out.push('\n');
            }
            Some('t') => {
                chars.next();
                out.push('\t');
            }
            Some('r') => {
                chars.next();
                out.push('\r');
            }
            Some('"') => {
                chars.next();
                out.push('"');
            }
            Some('\\') => {
                chars.next();
                out.push('\\');
            }
            Some('/') => {
                chars.next();
                out.push('/');
            }
            Some('u') => {
                chars.next();
                let digits: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&digits);
                    }
                }
            }
            _ => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unescapes_common_sequences() {
        assert_eq!(unicode_unescape("a\\nb"), "a\nb");
        assert_eq!(unicode_unescape("\\u4f60\\u597d"), "你好");
        assert_eq!(unicode_unescape("no escapes"), "no escapes");
        assert_eq!(unicode_unescape("trailing\\"), "trailing\\");
        assert_eq!(unicode_unescape("\\uZZZZ"), "\\uZZZZ");
    }

    #[test]
    fn empty_error_template_is_ignored() {
        let value: Value =
            serde_json::from_str(r#"{"message": "", "type": "", "param": "", "code": null}"#)
                .unwrap();
        assert!(error_field_is_empty(&value));
        assert!(!error_field_is_empty(&Value::String("boom".to_string())));

        // Only the exact template counts: a populated param is a real error.
        let value: Value = serde_json::from_str(
            r#"{"message": "", "type": "", "param": "billing", "code": null}"#,
        )
        .unwrap();
        assert!(!error_field_is_empty(&value));
        // So is a template missing one of the four keys.
        let value: Value =
            serde_json::from_str(r#"{"message": "", "type": "", "code": null}"#).unwrap();
        assert!(!error_field_is_empty(&value));
    }
}
