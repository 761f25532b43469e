//! Command and dispatch error definitions.

use axum::http::StatusCode;
use thiserror::Error;

use crate::transport::TransportError;

/// Errors returned by a command handler.
#[derive(Debug, Error)]
pub enum CommandError {
    /// A required argument is missing or has the wrong type.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The outbound request failed before any response arrived.
    #[error("request failed: {0}")]
    UpstreamUnreachable(String),

    /// The upstream body could not be read to completion.
    #[error("failed to read response body: {0}")]
    UpstreamRead(String),

    /// The upstream declared a JSON body that does not parse.
    #[error("failed to parse JSON response: {0}")]
    UpstreamBodyMalformed(String),

    /// The response transport rejected a write.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors surfaced by the dispatcher before or around handler invocation.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The inbound envelope is not valid `{cmd, args}` JSON.
    #[error("Invalid request format")]
    Decode(#[source] serde_json::Error),

    /// No handler is registered under the requested name.
    #[error("Command not found")]
    CommandNotFound(String),

    /// The handler failed while nothing had been sent.
    #[error("{0}")]
    Command(#[from] CommandError),

    /// The handler returned without producing output.
    #[error("Command produced no response")]
    NoResponse,
}

/// Result type for command handlers.
pub type CommandResult<T = ()> = Result<T, CommandError>;

impl DispatchError {
    /// Status code of the error envelope.
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::Decode(_) => StatusCode::BAD_REQUEST,
            DispatchError::CommandNotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::Command(_) | DispatchError::NoResponse => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Decode(_) => "decode_error",
            DispatchError::CommandNotFound(_) => "command_not_found",
            DispatchError::Command(CommandError::InvalidArgument(_)) => "invalid_argument",
            DispatchError::Command(CommandError::UpstreamUnreachable(_)) => "upstream_unreachable",
            DispatchError::Command(CommandError::UpstreamRead(_)) => "upstream_read",
            DispatchError::Command(CommandError::UpstreamBodyMalformed(_)) => {
                "upstream_body_malformed"
            }
            DispatchError::Command(CommandError::Transport(_)) => "transport",
            DispatchError::NoResponse => "no_response",
        }
    }
}
