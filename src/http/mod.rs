//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, method policy)
//!     → request.rs (request ID)
//!     → middleware/cors.rs (CORS headers, when configured)
//!     → command dispatcher (spawned task + HttpTransport)
//!     → response.rs (envelopes for requests that never reach a command)
//!     → Send to client
//! ```

pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
