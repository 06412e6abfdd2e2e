//! push-gateway: standalone push gateway server.

use anyhow::{Context, Result};
use clap::Parser;
use rd_01_push_gateway::{GatewayConfig, PushGatewayService};
use shared_types::BuildVersion;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Push gateway: admission control and fan-out for long-lived event streams
#[derive(Parser, Debug)]
#[command(name = "push-gateway")]
#[command(about = "Serve per-user event streams with admission control and liveness tracking")]
struct Args {
    /// JSON configuration file; missing fields take their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind host
    #[arg(long)]
    host: Option<IpAddr>,

    /// Override the bind port
    #[arg(short, long)]
    port: Option<u16>,

    /// Build identifier echoed in the version header
    #[arg(long, env = "APP_VERSION")]
    build_version: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            GatewayConfig::from_json(&raw)?
        }
        None => GatewayConfig::default(),
    };
    if let Some(host) = args.host {
        config.http.host = host;
    }
    if let Some(port) = args.port {
        config.http.port = port;
    }

    let version = match &args.build_version {
        Some(raw) => BuildVersion::parse(raw).context("invalid build version")?,
        None => BuildVersion::from_pkg(),
    };

    let service = PushGatewayService::new(config, version)?;
    let listener = service.bind().await?;

    service
        .run_until(listener, async {
            // Ctrl+C failing to install leaves only external termination
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("Shutdown complete");
    Ok(())
}
