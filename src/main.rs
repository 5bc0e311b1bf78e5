//! ChatStream Client - Entry Point
//!
//! CLI application for the interactive chat client.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write as _;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::signal;
use tracing::{error, info, warn};

use chatstream_client::connection::{ConnectionManager, ConnectionState, MessageHandler};
use chatstream_client::protocol::{ClientMessage, ServerEvent};
use chatstream_client::{Config, VERSION};

/// ChatStream Client - real-time chat over a reconnecting WebSocket
#[derive(Parser)]
#[command(name = "chatstream-client")]
#[command(version = VERSION)]
#[command(about = "Reconnecting WebSocket client for the ChatStream chat service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the interactive chat client
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "client-config.toml")]
        config: PathBuf,
    },
    /// Test connection to the server
    TestConnection {
        /// Path to configuration file
        #[arg(short, long, default_value = "client-config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => run_client(config).await,
        Commands::TestConnection { config } => test_connection(config).await,
    }
}

async fn run_client(config_path: PathBuf) -> Result<()> {
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    init_tracing(&config.logging)?;

    info!(
        version = VERSION,
        server = %config.server.url,
        "Starting ChatStream client"
    );

    let manager = ConnectionManager::new(config.connection(), Some(print_handler()));
    manager.connect();

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        let text = line.trim();
                        if text.is_empty() {
                            continue;
                        }
                        if !manager.send(&ClientMessage::chat(text)) {
                            warn!("Not connected, message dropped");
                        }
                    }
                    None => {
                        info!("Input closed");
                        break;
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    manager.disconnect();
    info!("Client stopped");
    Ok(())
}

/// Handler that renders streamed chat output to stdout and routes the rest
/// through tracing.
fn print_handler() -> MessageHandler {
    Box::new(|event| match event {
        ServerEvent::Message {
            content,
            is_complete,
            ..
        } => {
            if is_complete {
                println!();
            } else {
                print!("{content}");
                let _ = std::io::stdout().flush();
            }
        }
        ServerEvent::Status { status, message } => {
            info!(%status, message = message.as_deref().unwrap_or(""), "Server status");
        }
        ServerEvent::Error { message } => {
            error!(%message, "Server error");
        }
        ServerEvent::Pong { .. } | ServerEvent::Unknown => {}
    })
}

async fn test_connection(config_path: PathBuf) -> Result<()> {
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!(server = %config.server.url, "Testing connection to server");

    let manager = ConnectionManager::new(config.connection(), None);
    manager.connect();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        match manager.state() {
            ConnectionState::Open => break,
            ConnectionState::Failed => {
                anyhow::bail!(
                    "connection failed: {}",
                    manager.last_error().unwrap_or_default()
                );
            }
            _ if tokio::time::Instant::now() >= deadline => {
                anyhow::bail!("timed out waiting for connection");
            }
            _ => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }

    println!("{}", serde_json::to_string_pretty(&manager.status())?);
    info!("Connection test successful!");

    manager.disconnect();
    Ok(())
}

fn init_tracing(logging_config: &chatstream_client::config::LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging_config.level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if logging_config.format == "json" {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer()).init();
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
