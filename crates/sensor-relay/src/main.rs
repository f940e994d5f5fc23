//! sensor-relay: TCP connector between socket-framed sensors and the bridge

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sensor_relay::{Connector, LorawanRestClient, RelayConfig};

#[derive(Parser)]
#[command(name = "sensor-relay")]
#[command(about = "Relays socket-framed sensor requests to the bridge's LoRaWAN REST endpoint")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address sensors connect to
    #[arg(short = 'l', long)]
    listen_addr: Option<SocketAddr>,

    /// Base URL of the bridge
    #[arg(short, long)]
    bridge_url: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "sensor_relay={},sensor_transport={}",
            args.log_level, args.log_level
        ))
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting sensor-relay");

    // Load configuration
    let mut config = match &args.config {
        Some(path) => RelayConfig::load_from_file(path)?,
        None => RelayConfig::default(),
    };
    config.apply_env()?;
    if let Some(addr) = args.listen_addr {
        config.listen_addr = addr;
    }
    if let Some(url) = args.bridge_url {
        config.bridge_url = url;
    }
    config.validate()?;

    let client = LorawanRestClient::with_timeout(&config.bridge_url, config.request_timeout())?;
    let connector = Connector::bind(config.listen_addr, client).await?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
    };
    connector.run_until(shutdown).await?;

    info!("sensor-relay stopped");
    Ok(())
}
