//! Line framing for streamed responses.
//!
//! Providers stream either Server-Sent Events (`data: {...}` lines) or
//! newline-delimited JSON. Network chunks do not respect line boundaries, so
//! bytes are buffered until a full line is available.

use super::AgentError;
use futures_util::stream::{Stream, StreamExt};

/// Accumulates raw bytes and yields complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and drain every line terminated by `\n`. Trailing `\r` is
    /// stripped and blank lines are skipped.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1])
                .trim_end_matches('\r')
                .to_string();
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Remaining unterminated content, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.buf).trim().to_string();
        self.buf.clear();
        (!rest.is_empty()).then_some(rest)
    }
}

/// Payload of an SSE `data:` line. Other SSE fields (`event:`, `id:`, comments)
/// yield `None`.
pub fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(|d| d.trim_start())
}

/// Turn a byte stream into a stream of complete lines.
///
/// Dropping the returned stream drops the underlying response body, which
/// stops reading from the upstream connection.
pub fn lines<S, B, E>(bytes: S) -> impl Stream<Item = Result<String, AgentError>> + Send + 'static
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        let mut buffer = LineBuffer::new();
        let mut bytes = Box::pin(bytes);
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    for line in buffer.push(chunk.as_ref()) {
                        yield Ok(line);
                    }
                }
                Err(e) => {
                    yield Err(AgentError::Network(format!("stream interrupted: {}", e)));
                    return;
                }
            }
        }
        if let Some(rest) = buffer.finish() {
            yield Ok(rest);
        }
    }
}
