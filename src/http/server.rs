//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the command endpoint
//! - Wire up middleware (tracing, request ID, CORS) and the body size limit
//! - Enforce the method policy (POST, CORS preflight, 405)
//! - Run each dispatch in its own task bound to an [`HttpTransport`]
//! - Serve until the shutdown signal

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{HeaderValue, Method, Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::Instrument;

use crate::command::{CommandRegistry, Dispatcher};
use crate::config::ServerConfig;
use crate::http::middleware::cors::cors_middleware;
use crate::http::request::{request_id, MakeRequestUuid};
use crate::http::response::{error_response, method_not_allowed};
use crate::transport::HttpTransport;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub cors_enabled: bool,
    pub streaming_enabled: bool,
    pub event_buffer: usize,
}

/// HTTP server for the command endpoint.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
}

impl HttpServer {
    /// Create a server with the built-in commands.
    pub fn new(config: ServerConfig) -> Self {
        let registry = CommandRegistry::with_builtins(&config.fetch);
        Self::with_registry(config, registry)
    }

    /// Create a server around an already populated registry.
    pub fn with_registry(config: ServerConfig, registry: CommandRegistry) -> Self {
        tracing::info!(commands = ?registry.names(), "Command registry ready");

        let state = AppState {
            dispatcher: Dispatcher::new(Arc::new(registry)),
            cors_enabled: config.cors.enabled(),
            streaming_enabled: config.fetch.streaming_enabled,
            event_buffer: config.fetch.event_buffer,
        };

        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        let router = Router::new()
            .route("/{*path}", any(command_handler))
            .route("/", any(command_handler))
            .with_state(state)
            .layer(DefaultBodyLimit::max(config.listener.max_body_size))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http().make_span_with(
                        |request: &Request<Body>| {
                            tracing::info_span!(
                                "request",
                                method = %request.method(),
                                uri = %request.uri(),
                                request_id = %request_id(request.headers()),
                            )
                        },
                    ))
                    .layer(PropagateRequestIdLayer::x_request_id()),
            );

        if !config.cors.enabled() {
            return router;
        }
        match HeaderValue::from_str(&config.cors.origin) {
            Ok(origin) => router.layer(middleware::from_fn_with_state(origin, cors_middleware)),
            Err(e) => {
                tracing::error!(origin = %config.cors.origin, error = %e, "Invalid CORS origin; CORS disabled");
                router
            }
        }
    }

    /// The router, for serving on a custom stack or in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            cors = %self.config.cors.origin,
            streaming = self.config.fetch.streaming_enabled,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Command endpoint.
///
/// The dispatch runs in a spawned task; this handler returns as soon as the
/// transport hands over a response head. Streaming bodies keep flowing from
/// the task afterwards.
async fn command_handler(
    State(state): State<AppState>,
    method: Method,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    if method == Method::OPTIONS && state.cors_enabled {
        return StatusCode::OK.into_response();
    }
    if method != Method::POST {
        tracing::debug!(method = %method, "Rejecting method");
        return method_not_allowed();
    }
    let body = match body {
        Ok(body) => body,
        Err(rejection) => return body_rejected(rejection),
    };

    let (mut transport, head) = HttpTransport::new(state.streaming_enabled, state.event_buffer);
    let dispatcher = state.dispatcher.clone();
    tokio::spawn(
        async move {
            dispatcher.dispatch(&body, &mut transport).await;
        }
        .instrument(tracing::Span::current()),
    );

    match head.await {
        Ok(response) => response,
        Err(_) => {
            tracing::error!("Dispatch ended without a response");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Command produced no response",
            )
        }
    }
}

/// Error envelope for a body that could not be read (over the limit, or cut off).
fn body_rejected(rejection: BytesRejection) -> Response {
    let status = rejection.status();
    tracing::debug!(status = %status, error = %rejection.body_text(), "Rejecting request body");
    let message = if status == StatusCode::PAYLOAD_TOO_LARGE {
        "Request body too large"
    } else {
        "Invalid request format"
    };
    error_response(status, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::header;
    use serde_json::Value;
    use tower::ServiceExt;

    fn server(cors: &str) -> HttpServer {
        let mut config = ServerConfig::default();
        config.cors.origin = cors.to_string();
        HttpServer::new(config)
    }

    fn request(method: Method, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_command_404() {
        let response = server("")
            .router()
            .oneshot(request(Method::POST, r#"{"cmd":"missing","args":{}}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key("x-request-id"));
        let body = json_body(response).await;
        assert_eq!(body["statuscode"], 404);
        assert_eq!(body["body"]["error"], "Command not found");
    }

    #[tokio::test]
    async fn test_malformed_json_400() {
        let response = server("")
            .router()
            .oneshot(request(Method::POST, "{"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["body"]["error"], "Invalid request format");
    }

    #[tokio::test]
    async fn test_invalid_fetch_arguments_500() {
        let response = server("")
            .router()
            .oneshot(request(Method::POST, r#"{"cmd":"fetch","args":{"url":"http://x"}}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["body"]["error"], "invalid argument: method must be a string");
    }

    #[tokio::test]
    async fn test_oversized_body_is_413_envelope() {
        let mut config = ServerConfig::default();
        config.listener.max_body_size = 16;
        let body = format!(r#"{{"cmd":"fetch","args":{{"pad":"{}"}}}}"#, "x".repeat(64));
        let response = HttpServer::new(config)
            .router()
            .oneshot(request(Method::POST, &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        let body = json_body(response).await;
        assert_eq!(body["statuscode"], 413);
        assert_eq!(body["body"]["error"], "Request body too large");
    }

    #[tokio::test]
    async fn test_get_is_405() {
        let response = server("")
            .router()
            .oneshot(request(Method::GET, ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_options_without_cors_is_405() {
        let response = server("")
            .router()
            .oneshot(request(Method::OPTIONS, ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(!response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let response = server("*")
            .router()
            .oneshot(request(Method::OPTIONS, ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_cors_on_error_envelope() {
        let response = server("https://app.example")
            .router()
            .oneshot(request(Method::POST, "nope"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.example"
        );
    }
}
