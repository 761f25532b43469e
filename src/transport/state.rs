//! Response transport state machine.
//!
//! ```text
//! Idle ──write_buffered──▶ StartedBuffered ──▶ Ended
//!  │
//!  └──first stream_event──▶ StartedStreaming ──end_stream──▶ Ended
//! ```
//!
//! Every transport implementation delegates its transitions to
//! [`TransportState`], so the one-shot and mutual-exclusion rules hold no
//! matter which connection the transport is bound to.

use crate::transport::TransportError;

/// Lifecycle of a single response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    /// Nothing has been sent yet.
    #[default]
    Idle,
    /// A buffered envelope is being written.
    StartedBuffered,
    /// The event stream is open.
    StartedStreaming,
    /// The response is complete; no further writes are accepted.
    Ended,
}

/// What a successful `stream_event` transition means for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStep {
    /// First event: the stream-open framing must be emitted before it.
    Open,
    /// The stream is already open.
    Continue,
}

impl TransportState {
    /// True once any output has been committed to the connection.
    pub fn is_started(self) -> bool {
        self != TransportState::Idle
    }

    /// Transition for a buffered write. Only legal from `Idle`.
    pub fn begin_buffered(&mut self) -> Result<(), TransportError> {
        match self {
            TransportState::Idle => {
                *self = TransportState::StartedBuffered;
                Ok(())
            }
            TransportState::Ended => Err(TransportError::Closed),
            _ => Err(TransportError::AlreadyStarted),
        }
    }

    /// Marks a buffered write as fully sent.
    pub fn finish_buffered(&mut self) {
        if *self == TransportState::StartedBuffered {
            *self = TransportState::Ended;
        }
    }

    /// Transition for a stream event.
    ///
    /// `can_stream` is the connection's incremental-flush capability; when it
    /// is missing the state is left at `Idle`.
    pub fn begin_event(&mut self, can_stream: bool) -> Result<StreamStep, TransportError> {
        match self {
            TransportState::Idle if !can_stream => Err(TransportError::Unsupported),
            TransportState::Idle => {
                *self = TransportState::StartedStreaming;
                Ok(StreamStep::Open)
            }
            TransportState::StartedStreaming => Ok(StreamStep::Continue),
            TransportState::StartedBuffered => Err(TransportError::AlreadyStarted),
            TransportState::Ended => Err(TransportError::Closed),
        }
    }

    /// Transition for the terminal stream marker.
    pub fn end_stream(&mut self) -> Result<(), TransportError> {
        match self {
            TransportState::StartedStreaming => {
                *self = TransportState::Ended;
                Ok(())
            }
            TransportState::Idle => Err(TransportError::NotStarted),
            TransportState::StartedBuffered => Err(TransportError::AlreadyStarted),
            TransportState::Ended => Err(TransportError::Closed),
        }
    }
}
