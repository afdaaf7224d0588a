//! Registry daemon.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use cohort_registry_server::{Error, NodeConfig, run_node};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Address to accept member connections on
    #[arg(long, default_value = "127.0.0.1:7400", env = "COHORT_LISTEN_ADDR")]
    listen_addr: SocketAddr,

    /// Directory holding the registry snapshot
    #[arg(long, default_value = "/tmp/cohort/registry", env = "COHORT_SNAPSHOT_DIR")]
    snapshot_dir: PathBuf,

    /// Seconds an open connection may wait for its next request
    #[arg(long, default_value_t = 60, env = "COHORT_REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: u64,
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = sigint.recv() => info!("Received SIGINT"),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
            }
        }
    }

    let _ = tokio::signal::ctrl_c().await;
    info!("Received interrupt signal");
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = NodeConfig {
        listen_addr: args.listen_addr,
        snapshot_dir: args.snapshot_dir,
        request_timeout: Duration::from_secs(args.request_timeout_secs),
    };

    let shutdown_token = CancellationToken::new();

    let signal_shutdown_token = shutdown_token.clone();
    tokio::spawn(async move {
        wait_for_signal().await;

        info!("Shutting down");
        signal_shutdown_token.cancel();
    });

    run_node(config, shutdown_token).await
}
