//! Responses produced by the HTTP layer itself.
//!
//! Command output goes through [`HttpTransport`](crate::transport::HttpTransport);
//! the helpers here cover requests that never reach a command.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::transport::{envelope, error_parts};

/// Buffered error envelope with `status` as both HTTP and envelope status.
pub fn error_response(status: StatusCode, message: &str) -> Response {
    let (headers, body) = error_parts(message);
    (status, Json(envelope(status.as_u16(), &headers, body))).into_response()
}

/// Plain-text 405 for anything but POST (and CORS preflight).
pub fn method_not_allowed() -> Response {
    (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response()
}
