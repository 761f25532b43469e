//! Command execution server.
//!
//! # Architecture Overview
//!
//! ```text
//!     POST / {cmd, args}
//!     ─────────────────▶ http server ──▶ dispatcher ──▶ registry ──▶ fetch command
//!                                                                        │
//!                                                                  upstream HTTP
//!                                                                        │
//!     ◀───────────────── HttpTransport (JSON envelope | SSE events) ◀────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use command_server::config::ServerConfig;
use command_server::http::HttpServer;
use command_server::lifecycle::{resolve_config, signals, Overrides, Shutdown};
use command_server::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "command-server")]
#[command(about = "Runs named commands submitted over HTTP", long_about = None)]
struct Cli {
    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// CORS origin to allow ("*" for any)
    #[arg(long)]
    cors: Option<String>,

    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config: ServerConfig = resolve_config(&Overrides {
        config_path: cli.config,
        port: cli.port,
        cors: cli.cors,
        log_level: cli.log_level,
    })?;

    logging::init_logging(&config.observability);
    tracing::info!("command-server v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        chunk_size = config.fetch.chunk_size,
        cors_enabled = config.cors.enabled(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
