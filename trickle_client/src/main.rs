//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p trickle_client -- [--config client.json] [--origin http://127.0.0.1:3000/]
//!                                   [--user-id <id>] [--token <token>]
//!
//! The client opens the event connection, keeps it alive, and prints chat and
//! link changes as they happen.
//!
//! Console commands:
//!   move <n|e|s|w> - Step one tile (predicted locally)
//!   attack         - Attack in the current facing
//!   say <message>  - Send chat message
//!   status         - Show link, position and counters
//!   who            - List other players
//!   chat           - Show recent chat
//!   dump           - Print the world mirror as JSON
//!   quit           - Exit client

use std::env;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::info;
use trickle_client::client::GameClient;
use trickle_shared::config::ClientConfig;

/// How often the loop looks for new chat lines.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn parse_args() -> anyhow::Result<ClientConfig> {
    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut overrides: Vec<(&str, String)> = Vec::new();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                config_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            flag @ ("--origin" | "--user-id" | "--token") if i + 1 < args.len() => {
                overrides.push((flag, args[i + 1].clone()));
                i += 2;
            }
            _ => i += 1,
        }
    }

    let mut cfg = match config_path {
        Some(path) => ClientConfig::from_json_file(&path)?,
        None => ClientConfig::default(),
    };
    for (flag, value) in overrides {
        match flag {
            "--origin" => cfg.origin = value,
            "--user-id" => cfg.user_id = value,
            _ => cfg.token = value,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args().context("load config")?;
    info!(origin = %cfg.origin, user_id = %cfg.user_id, "Starting client");

    let mut client = GameClient::connect(&cfg).context("start client")?;

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Type 'status' for info, 'quit' to exit.");
    println!();

    let mut link = client.connection().watch_link();
    let mut chat_seen = 0;
    let mut poll = tokio::time::interval(POLL_INTERVAL);

    loop {
        tokio::select! {
            line = console_rx.recv() => {
                let Some(line) = line else { break };
                if matches!(line.as_str(), "quit" | "exit") {
                    break;
                }
                match client.exec_console(&line) {
                    Ok(output) => {
                        for line in output {
                            println!("{}", line);
                        }
                    }
                    Err(e) => println!("Error: {}", e),
                }
            }
            changed = link.changed() => {
                if changed.is_err() {
                    println!("Connection driver stopped.");
                    break;
                }
                let state = *link.borrow_and_update();
                println!("Link: {}", state);
            }
            _ = poll.tick() => {
                let fresh = client.world().chat_since(chat_seen);
                chat_seen += fresh.len();
                for entry in fresh {
                    println!("<{}> {}", entry.user_id.as_deref().unwrap_or("?"), entry.msg);
                }
            }
        }
    }

    client.shutdown();
    Ok(())
}
