//! `depot` binary: serve a directory of files over TCP.

use anyhow::{Context, Result};
use clap::Parser;
use depot::engine::EngineConfig;
use depot::server::Server;
use depot::store::pool::DEFAULT_POOL_SIZE;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "depot", version, about = "Small network file store")]
struct Cli {
    /// Directory files are stored under (created if missing)
    root: PathBuf,

    /// TCP port to listen on
    #[arg(value_parser = clap::value_parser!(u16).range(1024..))]
    port: u16,

    /// Address to bind
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind: IpAddr,

    /// Concurrent write tasks per connection
    #[arg(long, default_value_t = DEFAULT_POOL_SIZE)]
    workers: usize,

    /// Seconds of idle before a request is treated as complete
    #[arg(long, default_value_t = 5)]
    idle_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if !cli.root.exists() {
        std::fs::create_dir_all(&cli.root)
            .with_context(|| format!("failed to create {}", cli.root.display()))?;
    }

    let mut config = EngineConfig::new(&cli.root);
    config.pool_size = cli.workers.max(1);
    config.idle_timeout = Duration::from_secs(cli.idle_timeout);

    let server = Server::bind(SocketAddr::new(cli.bind, cli.port), config).await?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            Ok(())
        }
    }
}
