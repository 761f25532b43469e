//! Request envelope dispatch.
//!
//! # Responsibilities
//! - Decode `{cmd, args}` from the raw request body
//! - Resolve the handler in the registry
//! - Invoke it with a transport bound to the caller's connection
//! - Convert failures into a buffered error envelope while nothing was sent
//!
//! ```text
//! Received → Decoded → Resolved → HandlerInvoked → {Responded | Errored}
//! ```

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Deserializer};

use crate::command::{Arguments, CommandError, CommandRegistry, DispatchError};
use crate::observability::metrics;
use crate::transport::{error_parts, ResponseTransport};

/// Inbound request envelope.
///
/// Missing or `null` fields take their empty value: an unnamed command fails
/// the registry lookup, and `args` becomes `{}`.
#[derive(Debug, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default, deserialize_with = "null_as_default")]
    pub cmd: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub args: Arguments,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// How a dispatch ended.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The handler produced its own response.
    Responded,
    /// An error envelope was written in place of a response.
    Rejected(DispatchError),
    /// The handler failed after output had started; nothing more could be sent.
    Dropped(CommandError),
}

impl DispatchOutcome {
    fn label(&self) -> &'static str {
        match self {
            DispatchOutcome::Responded => "ok",
            DispatchOutcome::Rejected(err) => err.kind(),
            DispatchOutcome::Dropped(_) => "failed_after_start",
        }
    }
}

/// Turns one inbound envelope into exactly one response.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Dispatch the raw request `body`, writing the response to `transport`.
    ///
    /// `transport` must be fresh (idle).
    pub async fn dispatch(
        &self,
        body: &[u8],
        transport: &mut dyn ResponseTransport,
    ) -> DispatchOutcome {
        let start_time = Instant::now();

        let envelope: RequestEnvelope = match serde_json::from_slice(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(error = %e, "Rejecting malformed envelope");
                let outcome = reject(DispatchError::Decode(e), transport).await;
                metrics::record_command("-", outcome.label(), start_time);
                return outcome;
            }
        };

        let Some(command) = self.registry.resolve(&envelope.cmd) else {
            tracing::warn!(command = %envelope.cmd, "Command not found");
            let outcome = reject(DispatchError::CommandNotFound(envelope.cmd.clone()), transport).await;
            metrics::record_command("-", outcome.label(), start_time);
            return outcome;
        };

        tracing::debug!(command = %envelope.cmd, "Invoking command");
        let result = command.execute(envelope.args, transport).await;
        let started = transport.state().is_started();

        let outcome = match result {
            Ok(()) if started => DispatchOutcome::Responded,
            Ok(()) => reject(DispatchError::NoResponse, transport).await,
            Err(e) if !started => {
                tracing::warn!(command = %envelope.cmd, error = %e, "Command failed");
                reject(DispatchError::Command(e), transport).await
            }
            Err(e) => {
                tracing::warn!(
                    command = %envelope.cmd,
                    error = %e,
                    "Command failed after response started; dropping error"
                );
                DispatchOutcome::Dropped(e)
            }
        };

        metrics::record_command(&envelope.cmd, outcome.label(), start_time);
        outcome
    }
}

/// Write the error envelope for `err`. The transport is idle on every path
/// that reaches here.
async fn reject(err: DispatchError, transport: &mut dyn ResponseTransport) -> DispatchOutcome {
    let status = err.status().as_u16();
    let (headers, body) = error_parts(&err.to_string());
    if let Err(e) = transport.write_buffered(status, headers, body).await {
        tracing::debug!(error = %e, status, "Could not deliver error envelope");
    }
    DispatchOutcome::Rejected(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Command, CommandResult};
    use crate::config::FetchConfig;
    use crate::transport::{events, RecordedResponse, RecordingTransport, TransportError};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts invocations; behaviour chosen by `args.mode`.
    #[derive(Default)]
    struct Scripted {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Command for Scripted {
        async fn execute(
            &self,
            args: Arguments,
            transport: &mut dyn ResponseTransport,
        ) -> CommandResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match args.get("mode").and_then(Value::as_str) {
                Some("fail") => Err(CommandError::InvalidArgument("bad".into())),
                Some("silent") => Ok(()),
                Some("stream-then-fail") => {
                    transport.stream_event(events::START, json!({})).await?;
                    Err(CommandError::UpstreamRead("reset".into()))
                }
                Some("stream") => {
                    transport.stream_event(events::START, json!({})).await?;
                    transport.end_stream().await?;
                    Ok(())
                }
                _ => {
                    transport
                        .write_buffered(200, Default::default(), Value::Object(args))
                        .await?;
                    Ok(())
                }
            }
        }
    }

    fn dispatcher() -> (Dispatcher, Arc<AtomicUsize>) {
        let scripted = Scripted::default();
        let calls = scripted.calls.clone();
        let mut registry = CommandRegistry::new();
        registry.register("scripted", scripted);
        (Dispatcher::new(Arc::new(registry)), calls)
    }

    fn buffered(transport: &RecordingTransport) -> (u16, Value) {
        match transport.response() {
            Some(RecordedResponse::Buffered { status, body, .. }) => (*status, body.clone()),
            other => panic!("expected buffered response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let (dispatcher, calls) = dispatcher();
        let mut transport = RecordingTransport::new();
        let outcome = dispatcher
            .dispatch(br#"{"cmd":"nope","args":{}}"#, &mut transport)
            .await;

        assert!(matches!(
            outcome,
            DispatchOutcome::Rejected(DispatchError::CommandNotFound(_))
        ));
        assert_eq!(buffered(&transport), (404, json!({"error": "Command not found"})));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_envelope() {
        let (dispatcher, calls) = dispatcher();
        let bodies: [&[u8]; 5] = [
            b"{not json",
            b"[]",
            br#"{"cmd":5,"args":{}}"#,
            br#"{"cmd":"scripted","args":[1]}"#,
            br#"{"cmd":"scripted","args":"x"}"#,
        ];
        for body in bodies {
            let mut transport = RecordingTransport::new();
            let outcome = dispatcher.dispatch(body, &mut transport).await;
            assert!(matches!(outcome, DispatchOutcome::Rejected(DispatchError::Decode(_))));
            assert_eq!(
                buffered(&transport),
                (400, json!({"error": "Invalid request format"}))
            );
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_args_default_to_empty() {
        let (dispatcher, calls) = dispatcher();
        let mut transport = RecordingTransport::new();
        let outcome = dispatcher.dispatch(br#"{"cmd":"scripted"}"#, &mut transport).await;
        assert!(matches!(outcome, DispatchOutcome::Responded));
        assert_eq!(buffered(&transport), (200, json!({})));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_command_name_is_not_found() {
        let (dispatcher, calls) = dispatcher();
        let bodies: [&[u8]; 3] = [br#"{"args":{}}"#, br#"{"cmd":null}"#, b"{}"];
        for body in bodies {
            let mut transport = RecordingTransport::new();
            let outcome = dispatcher.dispatch(body, &mut transport).await;
            assert!(matches!(
                outcome,
                DispatchOutcome::Rejected(DispatchError::CommandNotFound(ref name)) if name.is_empty()
            ));
            assert_eq!(buffered(&transport), (404, json!({"error": "Command not found"})));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_null_args_reach_handler_as_empty() {
        let (dispatcher, calls) = dispatcher();
        let mut transport = RecordingTransport::new();
        let outcome = dispatcher
            .dispatch(br#"{"cmd":"scripted","args":null}"#, &mut transport)
            .await;
        assert!(matches!(outcome, DispatchOutcome::Responded));
        assert_eq!(buffered(&transport), (200, json!({})));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_with_null_args_fails_validation() {
        let registry = CommandRegistry::with_builtins(&FetchConfig::default());
        let dispatcher = Dispatcher::new(Arc::new(registry));
        assert!(dispatcher.registry().resolve("fetch").is_some());

        let mut transport = RecordingTransport::new();
        let outcome = dispatcher
            .dispatch(br#"{"cmd":"fetch","args":null}"#, &mut transport)
            .await;
        assert!(matches!(
            outcome,
            DispatchOutcome::Rejected(DispatchError::Command(CommandError::InvalidArgument(_)))
        ));
        assert_eq!(
            transport.into_response(),
            Some(RecordedResponse::Buffered {
                status: 500,
                headers: error_parts("").0,
                body: json!({"error": "invalid argument: method must be a string"}),
            })
        );
    }

    #[tokio::test]
    async fn test_failure_before_output() {
        let (dispatcher, _) = dispatcher();
        let mut transport = RecordingTransport::new();
        dispatcher
            .dispatch(br#"{"cmd":"scripted","args":{"mode":"fail"}}"#, &mut transport)
            .await;
        assert_eq!(
            buffered(&transport),
            (500, json!({"error": "invalid argument: bad"}))
        );
    }

    #[tokio::test]
    async fn test_silent_handler() {
        let (dispatcher, _) = dispatcher();
        let mut transport = RecordingTransport::new();
        dispatcher
            .dispatch(br#"{"cmd":"scripted","args":{"mode":"silent"}}"#, &mut transport)
            .await;
        assert_eq!(
            buffered(&transport),
            (500, json!({"error": "Command produced no response"}))
        );
    }

    #[tokio::test]
    async fn test_failure_after_output_is_dropped() {
        let (dispatcher, _) = dispatcher();
        let mut transport = RecordingTransport::new();
        let outcome = dispatcher
            .dispatch(
                br#"{"cmd":"scripted","args":{"mode":"stream-then-fail"}}"#,
                &mut transport,
            )
            .await;
        assert!(matches!(outcome, DispatchOutcome::Dropped(_)));
        // Only the event the handler sent; no buffered envelope was attempted.
        assert_eq!(transport.events().len(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_stream_becomes_envelope() {
        let (dispatcher, _) = dispatcher();
        let mut transport = RecordingTransport::without_streaming();
        let outcome = dispatcher
            .dispatch(br#"{"cmd":"scripted","args":{"mode":"stream"}}"#, &mut transport)
            .await;
        assert!(matches!(
            outcome,
            DispatchOutcome::Rejected(DispatchError::Command(CommandError::Transport(
                TransportError::Unsupported
            )))
        ));
        assert_eq!(
            buffered(&transport),
            (500, json!({"error": "transport error: streaming not supported"}))
        );
    }
}
