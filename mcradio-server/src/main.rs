//! Multicast Radio Server (mcradio-server) - Main entry point
//!
//! Scans the media library, then streams each channel as a sequence of UDP
//! datagrams to the configured multicast group until interrupted.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use mcradio_common::config::{load_toml, resolve_config_file, resolve_media_root};
use mcradio_common::logging::init_tracing;
use mcradio_common::MediaLibrary;
use mcradio_server::{RadioServer, ServerConfig};
use tokio::signal;
use tracing::info;

/// Command-line arguments for mcradio-server
#[derive(Parser, Debug)]
#[command(name = "mcradio-server")]
#[command(about = "Multicast channel radio server")]
#[command(version)]
struct Args {
    /// Path to TOML config file
    #[arg(short, long, env = "MCRADIO_CONFIG")]
    config: Option<PathBuf>,

    /// Media library root containing one directory per channel
    #[arg(short, long, env = "MCRADIO_MEDIA_ROOT")]
    media_root: Option<PathBuf>,

    /// Multicast group address
    #[arg(short, long, env = "MCRADIO_GROUP")]
    group: Option<Ipv4Addr>,

    /// UDP port
    #[arg(short, long, env = "MCRADIO_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_file(args.config.as_deref());
    let mut config: ServerConfig =
        load_toml(config_path.as_deref()).context("Failed to load configuration")?;

    if let Some(group) = args.group {
        config.network.group = group;
    }
    if let Some(port) = args.port {
        config.network.port = port;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    init_tracing(&config.logging, &["mcradio_server", "mcradio_common"])
        .context("Failed to initialize logging")?;

    config.validate().context("Invalid configuration")?;

    let media_root = resolve_media_root(args.media_root.as_deref(), config.media_root.as_deref());

    info!("Starting mcradio-server v{}", env!("CARGO_PKG_VERSION"));
    info!("Media root: {}", media_root.display());
    info!(
        "Multicast group: {} (ttl {})",
        config.network.destination(),
        config.network.ttl
    );

    let library = MediaLibrary::new(media_root, config.library.clone());
    let server = RadioServer::start(&config, library).context("Failed to start server")?;

    shutdown_signal().await?;

    tokio::task::spawn_blocking(move || server.stop())
        .await
        .context("Shutdown task failed")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .context("Failed to install Ctrl+C handler")
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install signal handler")?
            .recv()
            .await;
        Ok::<(), anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            info!("Received Ctrl+C, shutting down");
        },
        result = terminate => {
            result?;
            info!("Received terminate signal, shutting down");
        },
    }

    Ok(())
}
