//! `fetch` command: issue an HTTP request for the caller and relay the response.
//!
//! # Responsibilities
//! - Validate arguments into [`FetchParams`]
//! - Execute the outbound request with the shared client
//! - Buffered mode: read the full body, decode JSON bodies, write one envelope
//! - Streaming mode: `start`, one `data` event per chunk, `error` on a read
//!   failure, then `end`
//!
//! # Design Decisions
//! - No timeouts or retries; a stalled upstream stalls the request
//! - Errors before any output bubble up to the dispatcher
//! - Read errors after `start` are reported in-band, never escalated

pub mod chunk;
pub mod params;

use std::fmt::Display;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use serde_json::{json, Value};

use crate::command::{Arguments, Command, CommandError, CommandResult};
use crate::observability::metrics;
use crate::transport::{canonical_header_name, events, HeaderMultimap, ResponseTransport};

pub use chunk::{decode_chunk, is_json_content_type, ChunkKind, ChunkReader};
pub use params::FetchParams;

/// Default size of the windows relayed in streaming mode.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// HTTP proxy command.
#[derive(Debug, Clone)]
pub struct FetchCommand {
    client: reqwest::Client,
    chunk_size: usize,
}

impl FetchCommand {
    pub fn new(chunk_size: usize) -> Self {
        Self::with_client(reqwest::Client::new(), chunk_size)
    }

    /// Use an existing client (shared connection state, custom settings).
    pub fn with_client(client: reqwest::Client, chunk_size: usize) -> Self {
        Self {
            client,
            chunk_size: chunk_size.max(1),
        }
    }

    async fn send(&self, params: FetchParams) -> CommandResult<reqwest::Response> {
        let mut request = self
            .client
            .request(params.method, params.url)
            .headers(params.headers);
        if let Some(body) = params.body {
            request = request.body(body);
        }

        request.send().await.map_err(|e| {
            tracing::warn!(error = %e, "Upstream request failed");
            CommandError::UpstreamUnreachable(e.to_string())
        })
    }
}

impl Default for FetchCommand {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

#[async_trait]
impl Command for FetchCommand {
    async fn execute(
        &self,
        args: Arguments,
        transport: &mut dyn ResponseTransport,
    ) -> CommandResult {
        let params = FetchParams::from_args(&args)?;
        let stream = params.stream;
        let mode = if stream { "stream" } else { "buffered" };

        tracing::debug!(
            method = %params.method,
            url = %params.url,
            stream,
            "Issuing upstream request"
        );

        let response = match self.send(params).await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_upstream(mode, "unreachable");
                return Err(e);
            }
        };
        metrics::record_upstream(mode, "ok");

        if stream {
            let status = response.status().as_u16();
            let headers = header_multimap(response.headers());
            relay_stream(
                status,
                headers,
                Box::pin(response.bytes_stream()),
                self.chunk_size,
                transport,
            )
            .await
        } else {
            relay_buffered(response, transport).await
        }
    }
}

/// Buffered mode: one envelope with the whole body.
async fn relay_buffered(
    response: reqwest::Response,
    transport: &mut dyn ResponseTransport,
) -> CommandResult {
    let status = response.status().as_u16();
    let headers = header_multimap(response.headers());
    let json_body = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(is_json_content_type);

    let raw = response
        .bytes()
        .await
        .map_err(|e| CommandError::UpstreamRead(e.to_string()))?;

    let body = if json_body {
        serde_json::from_slice(&raw)
            .map_err(|e| CommandError::UpstreamBodyMalformed(e.to_string()))?
    } else {
        Value::String(String::from_utf8_lossy(&raw).into_owned())
    };

    transport.write_buffered(status, headers, body).await?;
    Ok(())
}

/// Streaming mode: relay `body` as `start`, `data`*, an optional `error`, `end`.
///
/// Each event is handed to the transport before the next window is read.
/// Only transport failures (client gone) are returned.
pub async fn relay_stream<S, E>(
    status: u16,
    headers: HeaderMultimap,
    body: S,
    chunk_size: usize,
    transport: &mut dyn ResponseTransport,
) -> CommandResult
where
    S: Stream<Item = Result<Bytes, E>> + Unpin + Send,
    E: Display + Send,
{
    transport
        .stream_event(
            events::START,
            json!({ "statuscode": status, "headers": headers }),
        )
        .await?;

    let mut reader = ChunkReader::new(body, chunk_size);
    let mut relayed = 0usize;
    loop {
        match reader.read().await {
            Ok(Some(chunk)) => {
                let (value, kind) = decode_chunk(&chunk);
                metrics::record_stream_chunk(kind.as_str());
                transport.stream_event(events::DATA, value).await?;
                relayed += 1;
            }
            Ok(None) => break,
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(error = %message, chunks = relayed, "Upstream body failed mid-stream");
                metrics::record_stream_chunk("error");
                transport
                    .stream_event(events::ERROR, json!({ "error": message }))
                    .await?;
                break;
            }
        }
    }

    tracing::debug!(chunks = relayed, "Upstream stream finished");
    transport.end_stream().await?;
    Ok(())
}

/// Header multimap as reported upstream, names canonicalized and values kept
/// in order.
pub fn header_multimap(headers: &HeaderMap) -> HeaderMultimap {
    let mut map = HeaderMultimap::new();
    for (name, value) in headers {
        map.entry(canonical_header_name(name.as_str()))
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    map
}
