//! Upstream IO: one stream adapter per provider wire format, plus the
//! heartbeat multiplexer and the first-chunk error wrapper that sit between
//! an adapter and the client connection.

pub mod audio;
pub mod client;
pub mod nonstream;
pub mod providers;
pub mod stream;
pub mod wrapper;

pub use client::build_upstream_client;
pub use nonstream::fetch_response;
pub use stream::{HEARTBEAT_INTERVAL, LineParser, StreamHandle, fetch_response_stream, with_heartbeat};
pub use wrapper::{FirstChunk, error_handling_wrapper};
