use bytes::Bytes;

use crate::chunk::END_OF_LINE;

/// Stream terminator frame.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Keep-alive comment frame. The leading `:` makes it an SSE comment, so it
/// can never be confused with a data line.
pub const HEARTBEAT_FRAME: &str = ": uni-api-heartbeat\n\n";

/// Wrap an arbitrary payload as an SSE data line.
pub fn data_frame(payload: &str) -> String {
    format!("data: {payload}{END_OF_LINE}")
}

/// Strip any leading run of the characters `d`, `a`, `t`, `:` and space.
///
/// This is the historical prefix-stripping the wire format grew around; it is
/// looser than removing a literal `data: ` (e.g. `data:data: x` becomes `x`)
/// and is kept for compatibility with existing clients.
pub fn strip_data_prefix(line: &str) -> &str {
    line.trim_start_matches(['d', 'a', 't', ':', ' '])
}

/// Incremental `\n` line splitter over a byte stream.
///
/// Bytes are buffered until a newline arrives; a trailing partial line (and
/// any split UTF-8 sequence) is retained verbatim across chunks.
#[derive(Debug, Default)]
pub struct LineScanner {
    buffer: Vec<u8>,
}

impl LineScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &Bytes) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let rest = self.buffer.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.buffer, rest);
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// The buffered partial line, if any, consumed.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}
