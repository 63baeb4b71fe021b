//! tinyrpc-cli - Command-line interface for tinyrpc
//!
//! Provides both a REPL and one-shot calls.

mod commands;
mod repl;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::net::SocketAddr;
use std::time::Duration;
use tinyrpc_client::{Client, ConnectionConfig};
use tinyrpc_protocol::SerializerKind;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tinyrpc-cli")]
#[command(about = "Command-line interface for tinyrpc servers")]
#[command(version)]
struct Cli {
    /// Server address
    #[arg(short, long, env = "TINYRPC_SERVER", default_value = "127.0.0.1:7000")]
    server: SocketAddr,

    /// Payload serializer (json or msgpack); must match the server
    #[arg(long, env = "TINYRPC_SERIALIZER", default_value = "json")]
    serializer: SerializerKind,

    /// Per-call timeout in seconds
    #[arg(short, long, default_value = "30")]
    timeout: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Start interactive REPL
    Repl,

    /// Round-trip a call through the echo route
    Ping,

    /// Call a route
    Call {
        /// Route name
        route: String,

        /// Argument JSON (or @file.json to read from file); null if omitted
        argument: Option<String>,
    },

    /// Call the hello route
    Hello {
        /// Text to send; a leading '#' marker is accepted
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let config = ConnectionConfig::new(cli.server)
        .with_serializer(cli.serializer)
        .with_request_timeout(Duration::from_secs(cli.timeout));
    let client = Client::new(config);

    match cli.command {
        Some(Commands::Repl) | None => {
            repl::run(client, cli.server).await?;
        }
        Some(cmd) => {
            // Connect for one-shot command
            client.connect().await.map_err(|e| {
                eprintln!("{}: {}", "Connection failed".red(), e);
                e
            })?;

            let result = commands::execute(&client, cmd).await;

            match result {
                Ok(output) => {
                    println!("{}", output);
                }
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    std::process::exit(1);
                }
            }

            client.close().await?;
        }
    }

    Ok(())
}
