//! Interactive REPL.

use crate::commands::{format_json, format_value, parse_json_arg, ping};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use serde_json::Value;
use std::net::SocketAddr;
use tinyrpc_client::Client;

const HELP_TEXT: &str = r#"
Available commands:
  help                          Show this help
  ping                          Round-trip through the echo route
  hello <text>                  Call the hello route
  call <route> [json]           Call any route with a JSON argument
  pending                       Show calls awaiting a response

  quit, exit                    Exit the REPL
"#;

pub async fn run(client: Client, addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "tinyrpc CLI".bold().cyan());
    println!("Connecting to {}...", addr);

    client.connect().await?;
    println!("{}", "Connected!".green());

    // Create readline editor
    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    // Load history
    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".tinyrpc_history"))
        .unwrap_or_else(|_| ".tinyrpc_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands.\n");

    loop {
        if !client.is_connected() {
            println!("{}", "Connection lost.".red());
            break;
        }

        let prompt = format!("{} ", "tinyrpc>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match execute_repl_command(&client, line).await {
                    Ok(Some(output)) => println!("{}\n", output),
                    Ok(None) => break, // Exit command
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    // Save history
    let _ = rl.save_history(&history_path);

    let _ = client.close().await;
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}

async fn execute_repl_command(
    client: &Client,
    line: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd.to_lowercase(), rest.trim()),
        None => (line.to_lowercase(), ""),
    };

    match cmd.as_str() {
        "help" | "?" => Ok(Some(HELP_TEXT.to_string())),

        "quit" | "exit" | "q" => Ok(None),

        "ping" => Ok(Some(ping(client).await?)),

        "hello" | "h" => {
            if rest.is_empty() {
                return Ok(Some("Usage: hello <text>".to_string()));
            }
            let result = client.call("hello", Value::String(rest.to_string())).await?;
            Ok(Some(format_value(&result).yellow().to_string()))
        }

        "call" | "c" => {
            let (route, argument) = match rest.split_once(char::is_whitespace) {
                Some((route, arg)) => (route, parse_json_arg(arg.trim())?),
                None => (rest, Value::Null),
            };
            if route.is_empty() {
                return Ok(Some("Usage: call <route> [json]".to_string()));
            }
            let result = client.call(route, argument).await?;
            Ok(Some(format_json(&result)))
        }

        "pending" => Ok(Some(format!(
            "{} call(s) awaiting a response",
            client.pending_count()
        ))),

        _ => Ok(Some(format!(
            "Unknown command: {}. Type 'help' for help.",
            cmd
        ))),
    }
}
