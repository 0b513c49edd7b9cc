mod console;

pub use console::ConsoleSurface;

use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::conversation::Message;
use crate::gateway;
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

/// `mas-coordinator` - routes a chat turn to the right agent.
#[derive(Parser, Debug)]
#[command(name = "mas-coordinator")]
#[command(version)]
#[command(about = "Multi-agent coordinator for chat completions.", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.mas-coordinator/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the chat-completions endpoint
    Serve {
        /// Bind host (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run one turn and print the answer
    Ask {
        /// The user message
        message: String,

        /// API key for the completion service (falls back to MAS_API_KEY / API_KEY)
        #[arg(long)]
        api_key: Option<String>,
    },
}

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            let port = port.unwrap_or(config.gateway.port);
            gateway::run_gateway(&host, port, Arc::new(config)).await
        }
        Commands::Ask { message, api_key } => {
            let api_key = resolve_api_key(api_key)?;
            ask(&config, &api_key, &message).await
        }
    }
}

fn resolve_api_key(explicit: Option<String>) -> Result<String> {
    explicit
        .or_else(|| std::env::var("MAS_API_KEY").ok())
        .or_else(|| std::env::var("API_KEY").ok())
        .filter(|key| !key.trim().is_empty())
        .context("No API key: pass --api-key or set MAS_API_KEY")
}

async fn ask(config: &Config, api_key: &str, message: &str) -> Result<()> {
    if message.trim().is_empty() {
        bail!("message must not be empty");
    }

    let coordinator = Coordinator::for_request(config, api_key);
    let surface = Arc::new(ConsoleSurface::new());
    let conversation = [Message::user(message)];

    let reply = coordinator
        .handle_turn(&conversation, None, surface)
        .await
        .context("coordination turn failed")?;
    println!();
    tracing::debug!(chars = reply.text.len(), "answer printed");
    Ok(())
}
