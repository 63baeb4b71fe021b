//! tinyrpc - demo server
//!
//! Serves the `hello` and `echo` routes over length-prefixed frames.

use serde_json::Value;
use std::sync::Arc;
use tinyrpc_protocol::marker;
use tinyrpc_server::{Config, HandlerError, Router, Server, ServerConfig};
use tracing_subscriber::EnvFilter;

/// Replies `echo:<text>`; a leading `#` marker section is dropped first.
fn hello(argument: Value) -> Result<Value, HandlerError> {
    let text = argument
        .as_str()
        .ok_or_else(|| HandlerError::InvalidArgument("hello expects a string".to_string()))?;
    let body = marker::strip(text, marker::DEFAULT_MARKER);
    Ok(Value::String(format!("echo:{}", body)))
}

fn echo(argument: Value) -> Result<Value, HandlerError> {
    Ok(argument)
}

fn demo_router() -> Router {
    Router::new().route("hello", hello).route("echo", echo)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if TINYRPC_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("TINYRPC_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            // If a config file was explicitly specified, fail on error
            if std::env::var("TINYRPC_CONFIG").is_ok() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            tracing::warn!("Invalid configuration ({}), using defaults", e);
            Config::default()
        }
    };

    tracing::info!("Starting tinyrpc server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Serializer: {}", config.protocol.serializer);
    tracing::info!("  Max frame size: {} bytes", config.protocol.max_frame_size);
    tracing::info!("  Max in-flight per connection: {}", config.workers.max_inflight);

    let server = Arc::new(Server::new(
        ServerConfig::from_config(&config),
        demo_router(),
    ));

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Run server (blocks until shutdown)
    server.run().await?;

    let stats = server.stats();
    tracing::info!(
        "Server stopped ({} connections, {} requests served)",
        stats
            .connections_total
            .load(std::sync::atomic::Ordering::Relaxed),
        stats.requests_total.load(std::sync::atomic::Ordering::Relaxed)
    );
    Ok(())
}
