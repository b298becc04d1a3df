//! Wire shapes for the downstream OpenAI-compatible surface.
//!
//! This crate intentionally does **not** depend on any HTTP client or server.
//! It defines the chunk/completion JSON shapes, the SSE framing constants, and
//! the incremental line scanner used by the upstream stream adapters.

pub mod chunk;
pub mod json;
pub mod sse;

pub use chunk::{
    COMPLETION_FINGERPRINT, ChatCompletion, ChatCompletionChunk, ChunkFields, END_OF_LINE,
    STREAM_FINGERPRINT, chat_id, completion_json, sse_chunk,
};
pub use sse::{DONE_FRAME, HEARTBEAT_FRAME, LineScanner, data_frame, strip_data_prefix};
