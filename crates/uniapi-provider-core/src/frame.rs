use bytes::Bytes;
use serde::{Deserialize, Serialize};

use uniapi_protocol::data_frame;

/// Error payload produced when an upstream exchange fails before (or instead
/// of) yielding usable chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamErrorBody {
    pub error: String,
    pub status_code: u16,
    pub details: serde_json::Value,
}

impl UpstreamErrorBody {
    /// `body` is the raw upstream response body: decoded as JSON when
    /// possible, kept as a string otherwise.
    pub fn from_status(context: &str, status_code: u16, body: &[u8]) -> Self {
        let text = String::from_utf8_lossy(body).into_owned();
        let details = serde_json::from_str(&text)
            .unwrap_or(serde_json::Value::String(text));
        Self {
            error: format!("{context} HTTP Error"),
            status_code,
            details,
        }
    }
}

/// One frame of the outbound stream, in adapter production order.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    /// An already-formatted SSE line (or comment frame).
    Data(String),
    /// Raw media bytes passed through without inspection.
    Audio(Bytes),
    /// Upstream failure; terminal for the stream that produced it.
    Error(UpstreamErrorBody),
}

impl StreamFrame {
    /// Encode the frame for the client connection.
    pub fn into_bytes(self) -> Bytes {
        match self {
            StreamFrame::Data(text) => Bytes::from(text),
            StreamFrame::Audio(bytes) => bytes,
            StreamFrame::Error(body) => {
                let json = serde_json::to_string(&body).unwrap_or_default();
                Bytes::from(data_frame(&json))
            }
        }
    }

    pub fn as_data(&self) -> Option<&str> {
        match self {
            StreamFrame::Data(text) => Some(text),
            _ => None,
        }
    }
}
