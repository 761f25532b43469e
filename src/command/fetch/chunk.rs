//! Bounded windows over an upstream body stream.
//!
//! Each read hands out at most `chunk_size` bytes, whatever frame sizes the
//! HTTP stack delivers. Windows do not track any payload framing.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde_json::Value;

/// Reads an upstream body in windows of at most `chunk_size` bytes.
pub struct ChunkReader<S> {
    inner: S,
    pending: Bytes,
    chunk_size: usize,
    done: bool,
}

impl<S, E> ChunkReader<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    pub fn new(inner: S, chunk_size: usize) -> Self {
        Self {
            inner,
            pending: Bytes::new(),
            chunk_size: chunk_size.max(1),
            done: false,
        }
    }

    /// Next non-empty window, `None` at end of body.
    ///
    /// After an error the reader is exhausted.
    pub async fn read(&mut self) -> Result<Option<Bytes>, E> {
        while self.pending.is_empty() {
            if self.done {
                return Ok(None);
            }
            match self.inner.next().await {
                Some(Ok(frame)) => self.pending = frame,
                Some(Err(e)) => {
                    self.done = true;
                    return Err(e);
                }
                None => self.done = true,
            }
        }
        let len = self.pending.len().min(self.chunk_size);
        Ok(Some(self.pending.split_to(len)))
    }
}

/// How a chunk was interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Json,
    Text,
}

impl ChunkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkKind::Json => "json",
            ChunkKind::Text => "text",
        }
    }
}

/// Interpret one window on its own: JSON if it parses, text otherwise.
///
/// Windows rarely line up with JSON values in a real stream, so most fall
/// back to text, and a window that happens to parse is emitted as JSON even
/// if it was never meant as one.
pub fn decode_chunk(chunk: &[u8]) -> (Value, ChunkKind) {
    match serde_json::from_slice(chunk) {
        Ok(value) => (value, ChunkKind::Json),
        Err(_) => (
            Value::String(String::from_utf8_lossy(chunk).into_owned()),
            ChunkKind::Text,
        ),
    }
}

/// True if `content_type` names a JSON payload (`application/json` or `*+json`).
pub fn is_json_content_type(content_type: &str) -> bool {
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    media_type == "application/json" || media_type.ends_with("+json")
}
