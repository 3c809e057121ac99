//! Marionette bridge daemon
//!
//! Binds the VMC listener, serves the REST surface, and runs until
//! interrupted. All animation state lives in the [`Bridge`].

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use marionette_runtime::{http, Bridge, BridgeConfig};

#[derive(Parser)]
#[command(name = "marionette")]
#[command(about = "VMC animation bridge between an avatar host and a text pipeline")]
#[command(version)]
struct Cli {
    /// UDP port to receive VMC data on (the host sends here)
    #[arg(long, default_value_t = 39539)]
    listen_port: u16,

    /// Host address to send VMC data to
    #[arg(long, default_value = "127.0.0.1")]
    send_host: IpAddr,

    /// Host port to send VMC data to
    #[arg(long, default_value_t = 39540)]
    send_port: u16,

    /// REST surface bind address
    #[arg(long, default_value = "127.0.0.1:8044")]
    http_addr: SocketAddr,

    /// Directory for presets and the rest-pose file
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = BridgeConfig {
        listen_addr: SocketAddr::from(([0, 0, 0, 0], cli.listen_port)),
        send_addr: SocketAddr::new(cli.send_host, cli.send_port),
        http_addr: cli.http_addr,
        data_dir: cli.data_dir,
    };

    let bridge = Arc::new(Bridge::new(config.clone()));
    bridge.recorder().start_server().await?;

    let listener = tokio::net::TcpListener::bind(config.http_addr).await?;
    info!(http = %config.http_addr, send = %config.send_addr, "marionette bridge up");

    axum::serve(listener, http::router(bridge)).await?;
    Ok(())
}
