//! Command execution.

use crate::Commands;
use colored::Colorize;
use serde_json::{json, Value};
use std::time::Instant;
use tinyrpc_client::Client;

/// Executes a command and returns the formatted output.
pub async fn execute(client: &Client, cmd: Commands) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Repl => Err("repl is not a one-shot command".into()),

        Commands::Ping => ping(client).await,

        Commands::Call { route, argument } => {
            let argument = match argument {
                Some(arg) => parse_json_arg(&arg)?,
                None => Value::Null,
            };
            let result = client.call(&route, argument).await?;
            Ok(format_json(&result))
        }

        Commands::Hello { text } => {
            let result = client.call("hello", Value::String(text)).await?;
            Ok(format_value(&result))
        }
    }
}

/// Calls `echo` and reports the round-trip time.
pub async fn ping(client: &Client) -> Result<String, Box<dyn std::error::Error>> {
    let started = Instant::now();
    let reply = client.call("echo", json!("ping")).await?;
    if reply != json!("ping") {
        return Err(format!("unexpected echo reply: {}", reply).into());
    }
    Ok(format!(
        "{} ({:.2} ms)",
        "PONG".green(),
        started.elapsed().as_secs_f64() * 1000.0
    ))
}

/// Parses a JSON argument, or reads it from a file when prefixed with '@'.
pub fn parse_json_arg(arg: &str) -> Result<Value, Box<dyn std::error::Error>> {
    if let Some(path) = arg.strip_prefix('@') {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        match serde_json::from_str(arg) {
            Ok(value) => Ok(value),
            // Bare words are sent as strings
            Err(_) => Ok(Value::String(arg.to_string())),
        }
    }
}

/// Strings print without quotes; everything else as pretty JSON.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => format_json(other),
    }
}

pub fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
