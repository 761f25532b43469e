//! In-memory transport that records everything written to it.

use async_trait::async_trait;
use serde_json::Value;

use crate::transport::state::TransportState;
use crate::transport::{events, HeaderMultimap, ResponseTransport, TransportError};

/// A response captured by [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedResponse {
    Buffered {
        status: u16,
        headers: HeaderMultimap,
        body: Value,
    },
    /// Events in emission order, including the terminal `end`.
    Stream(Vec<(String, Value)>),
}

/// Transport used by tests and by anything that wants the response as data.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    state: TransportState,
    streaming_unsupported: bool,
    response: Option<RecordedResponse>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose connection cannot stream.
    pub fn without_streaming() -> Self {
        Self {
            streaming_unsupported: true,
            ..Self::default()
        }
    }

    pub fn response(&self) -> Option<&RecordedResponse> {
        self.response.as_ref()
    }

    pub fn into_response(self) -> Option<RecordedResponse> {
        self.response
    }

    /// Recorded events, empty for buffered responses.
    pub fn events(&self) -> &[(String, Value)] {
        match &self.response {
            Some(RecordedResponse::Stream(events)) => events,
            _ => &[],
        }
    }
}

#[async_trait]
impl ResponseTransport for RecordingTransport {
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
        self.response = Some(RecordedResponse::Buffered {
            status,
            headers,
            body,
        });
        self.state.finish_buffered();
        Ok(())
    }

    async fn stream_event(&mut self, event: &str, data: Value) -> Result<(), TransportError> {
        self.state.begin_event(!self.streaming_unsupported)?;
        match self.response.get_or_insert_with(|| RecordedResponse::Stream(Vec::new())) {
            RecordedResponse::Stream(recorded) => recorded.push((event.to_string(), data)),
            RecordedResponse::Buffered { .. } => return Err(TransportError::AlreadyStarted),
        }
        Ok(())
    }

    async fn end_stream(&mut self) -> Result<(), TransportError> {
        self.state.end_stream()?;
        if let Some(RecordedResponse::Stream(recorded)) = &mut self.response {
            recorded.push((events::END.to_string(), Value::Object(Default::default())));
        }
        Ok(())
    }
}
