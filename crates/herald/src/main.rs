//! herald - MCP gateway for the beacon task monitor
//!
//! Subcommands:
//! - `herald serve` - Run the MCP gateway (HTTP -> WebSocket relay)
//! - `herald ping <endpoint>` - Test connectivity to a monitor
//! - `herald send <endpoint> <json>` - Send a raw envelope

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use beaconconf::HeraldConfig;
use herald::{commands, serve, telemetry};

#[derive(Parser)]
#[command(name = "herald")]
#[command(about = "MCP gateway for the beacon task monitor")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Test connectivity to a beacon monitor
    Ping {
        /// WebSocket endpoint (e.g., ws://localhost:2200)
        endpoint: String,

        /// Timeout in milliseconds
        #[arg(short, long, default_value = "5000")]
        timeout: u64,
    },

    /// Send a raw JSON envelope
    Send {
        /// WebSocket endpoint
        endpoint: String,

        /// JSON envelope ({"type": ..., "payload": ...})
        json: String,

        /// Timeout in milliseconds
        #[arg(short, long, default_value = "30000")]
        timeout: u64,
    },

    /// Run the MCP gateway server
    Serve {
        /// HTTP port to bind (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Monitor WebSocket endpoint (overrides config)
        #[arg(long)]
        monitor: Option<String>,

        /// Explicit config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ping { endpoint, timeout } => {
            telemetry::init("info");
            commands::ping(&endpoint, timeout).await?;
        }
        Commands::Send {
            endpoint,
            json,
            timeout,
        } => {
            telemetry::init("info");
            commands::send(&endpoint, &json, timeout).await?;
        }
        Commands::Serve {
            port,
            monitor,
            config,
        } => {
            let mut config = HeraldConfig::load_with_override(config.as_deref())?;
            if let Some(port) = port {
                config.bind.http_port = port;
            }
            if let Some(monitor) = monitor {
                config.monitor.endpoint = monitor;
            }

            telemetry::init(&config.telemetry.log_level);
            serve::run(serve::ServeConfig::from_config(&config)).await?;
        }
    }

    Ok(())
}
