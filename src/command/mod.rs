//! Command subsystem.
//!
//! # Data Flow
//! ```text
//! POST / {cmd, args}
//!     → dispatcher.rs (decode envelope, resolve, invoke, map failures)
//!     → registry.rs (name → handler, built once at startup)
//!     → fetch/ (outbound HTTP, buffered or streamed back)
//!     → ResponseTransport
//! ```
//!
//! # Design Decisions
//! - Registry is immutable after startup and shared via Arc
//! - Handlers receive the raw argument object and validate it themselves
//! - Failures are only convertible to an error envelope while the transport is idle

pub mod dispatcher;
pub mod error;
pub mod fetch;
pub mod registry;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::transport::ResponseTransport;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::{CommandError, CommandResult, DispatchError};
pub use fetch::FetchCommand;
pub use registry::CommandRegistry;

/// Argument object of a request envelope.
pub type Arguments = Map<String, Value>;

/// A unit of logic registered under a command name.
#[async_trait]
pub trait Command: Send + Sync {
    /// Run the command, writing its output to `transport`.
    ///
    /// Failures returned while the transport is still idle become an error
    /// envelope; after output started, the handler must report problems
    /// in-band.
    async fn execute(
        &self,
        args: Arguments,
        transport: &mut dyn ResponseTransport,
    ) -> CommandResult;
}
