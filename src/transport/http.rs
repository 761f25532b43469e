//! Transport bound to a live HTTP connection.
//!
//! # Responsibilities
//! - Hand the response head to the HTTP layer exactly once
//! - Buffered mode: one JSON envelope, upstream headers mirrored on the outer response
//! - Streaming mode: Server-Sent Events fed through a bounded channel
//!
//! The handler runs in its own task. The HTTP layer waits on the receiver
//! returned by [`HttpTransport::new`] and returns whatever response arrives
//! first; for streams the body keeps flowing after that.

use std::convert::Infallible;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::transport::state::{StreamStep, TransportState};
use crate::transport::{envelope, events, HeaderMultimap, ResponseTransport, TransportError};

/// Headers never copied from the envelope onto the outer response.
const SKIPPED_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
    "content-encoding",
    "content-type",
];

/// Response transport writing to an axum response.
pub struct HttpTransport {
    state: TransportState,
    streaming: bool,
    event_buffer: usize,
    head: Option<oneshot::Sender<Response>>,
    events: Option<mpsc::Sender<Event>>,
}

impl HttpTransport {
    /// Create a transport and the receiver the HTTP layer waits on.
    ///
    /// `streaming` is false when the connection cannot flush incrementally.
    pub fn new(streaming: bool, event_buffer: usize) -> (Self, oneshot::Receiver<Response>) {
        let (head_tx, head_rx) = oneshot::channel();
        let transport = Self {
            state: TransportState::Idle,
            streaming,
            event_buffer: event_buffer.max(1),
            head: Some(head_tx),
            events: None,
        };
        (transport, head_rx)
    }

    fn send_head(&mut self, response: Response) -> Result<(), TransportError> {
        let head = self.head.take().ok_or(TransportError::AlreadyStarted)?;
        head.send(response).map_err(|_| TransportError::ConnectionClosed)
    }

    fn open_stream(&mut self) -> Result<(), TransportError> {
        let (tx, rx) = mpsc::channel(self.event_buffer);
        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (Ok::<_, Infallible>(event), rx))
        });
        self.events = Some(tx);
        self.send_head(Sse::new(stream).into_response())
    }

    async fn send_event(&self, event: Event) -> Result<(), TransportError> {
        let tx = self.events.as_ref().ok_or(TransportError::NotStarted)?;
        tx.send(event)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }
}

#[async_trait]
impl ResponseTransport for HttpTransport {
    fn state(&self) -> TransportState {
        self.state
    }

    async fn write_buffered(
        &mut self,
        status: u16,
        headers: HeaderMultimap,
        body: Value,
    ) -> Result<(), TransportError> {
        self.state.begin_buffered()?;

        let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let outer = outer_headers(&headers);
        let response = (code, outer, Json(envelope(status, &headers, body))).into_response();

        let sent = self.send_head(response);
        self.state.finish_buffered();
        sent
    }

    async fn stream_event(&mut self, event: &str, data: Value) -> Result<(), TransportError> {
        if self.state.begin_event(self.streaming)? == StreamStep::Open {
            self.open_stream()?;
        }
        let payload = serde_json::to_string(&data)?;
        self.send_event(Event::default().event(event).data(payload))
            .await
    }

    async fn end_stream(&mut self) -> Result<(), TransportError> {
        self.state.end_stream()?;
        let sent = self
            .send_event(Event::default().event(events::END).data("{}"))
            .await;
        // Dropping the sender terminates the SSE body.
        self.events = None;
        sent
    }
}

/// Upstream headers that can be mirrored on the outer response.
fn outer_headers(headers: &HeaderMultimap) -> HeaderMap {
    let mut outer = HeaderMap::new();
    for (name, values) in headers {
        if SKIPPED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            continue;
        }
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        for value in values {
            if let Ok(value) = HeaderValue::from_str(value) {
                outer.append(name.clone(), value);
            }
        }
    }
    outer
}
