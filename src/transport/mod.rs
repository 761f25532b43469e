//! Response transport subsystem.
//!
//! # Data Flow
//! ```text
//! command handler
//!     → ResponseTransport (buffered envelope OR event stream)
//!     → state.rs (one-shot / mutual-exclusion checks)
//!     → http.rs (JSON body or SSE frames on the real connection)
//!     → recording.rs (in-memory sink for tests)
//! ```
//!
//! # Design Decisions
//! - Handlers pick buffered vs streaming at runtime; they never see HTTP
//! - The state machine is shared by every implementation
//! - Nothing can be retracted once the transport leaves `Idle`

pub mod http;
pub mod recording;
pub mod state;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use http::HttpTransport;
pub use recording::{RecordedResponse, RecordingTransport};
pub use state::TransportState;

/// Header multimap as it appears in envelopes and `start` events.
pub type HeaderMultimap = BTreeMap<String, Vec<String>>;

/// Event tags used on the stream.
pub mod events {
    pub const START: &str = "start";
    pub const DATA: &str = "data";
    pub const ERROR: &str = "error";
    pub const END: &str = "end";
}

/// Errors raised by a response transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Output has already started in some mode.
    #[error("response already started")]
    AlreadyStarted,

    /// `end_stream` was called before any event.
    #[error("response not started")]
    NotStarted,

    /// The response has ended.
    #[error("response already ended")]
    Closed,

    /// The connection cannot flush incrementally.
    #[error("streaming not supported")]
    Unsupported,

    /// The client went away before the write could be delivered.
    #[error("client connection closed")]
    ConnectionClosed,

    /// The payload could not be serialized.
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Sink for a single command response.
///
/// A transport lives exactly as long as one request. At most one of
/// [`write_buffered`](Self::write_buffered) or the stream operations may be
/// used on an instance.
#[async_trait]
pub trait ResponseTransport: Send {
    /// Current lifecycle state.
    fn state(&self) -> TransportState;

    /// Sends the whole response as one `{statuscode, headers, body}` envelope.
    async fn write_buffered(
        &mut self,
        status: u16,
        headers: HeaderMultimap,
        body: Value,
    ) -> Result<(), TransportError>;

    /// Emits one event, opening the stream on the first call.
    async fn stream_event(&mut self, event: &str, data: Value) -> Result<(), TransportError>;

    /// Emits the terminal `end` event.
    async fn end_stream(&mut self) -> Result<(), TransportError>;
}

/// Builds the `{statuscode, headers, body}` envelope.
pub fn envelope(status: u16, headers: &HeaderMultimap, body: Value) -> Value {
    serde_json::json!({
        "statuscode": status,
        "headers": headers,
        "body": body,
    })
}

/// Canonical form of a header name: `content-type` becomes `Content-Type`.
pub fn canonical_header_name(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}

/// Headers and body of an error envelope carrying `message`.
pub fn error_parts(message: &str) -> (HeaderMultimap, Value) {
    let headers = HeaderMultimap::from([(
        "Content-Type".to_string(),
        vec!["application/json".to_string()],
    )]);
    (headers, serde_json::json!({ "error": message }))
}
