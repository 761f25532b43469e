//! Command execution server library.
//!
//! Clients `POST /` a `{cmd, args}` envelope; the named command runs and
//! answers either with one buffered JSON envelope or with a Server-Sent
//! Events stream.

pub mod command;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod transport;

pub use command::{Command, CommandRegistry, Dispatcher};
pub use config::schema::ServerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use transport::ResponseTransport;
