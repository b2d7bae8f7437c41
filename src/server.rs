//! TCP front end.
//!
//! Owns the listening socket and fans each accepted connection out to
//! its own engine task. A connection failing, however messily, only
//! ever costs that connection; the accept loop carries on.

use crate::engine::{Connection, EngineConfig};
use crate::error::DepotError;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpSocket, TcpStream};

/// Pending-connection backlog for the listener.
const LISTEN_BACKLOG: u32 = 1024;

pub struct Server {
    listener: TcpListener,
    config: Arc<EngineConfig>,
}

impl Server {
    /// Bind the listening socket, with address reuse on.
    pub async fn bind(addr: SocketAddr, config: EngineConfig) -> Result<Self> {
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .context("failed to create listening socket")?;
        socket
            .set_reuseaddr(true)
            .context("failed to set SO_REUSEADDR")?;
        socket
            .bind(addr)
            .with_context(|| format!("failed to bind {addr}"))?;
        let listener = socket
            .listen(LISTEN_BACKLOG)
            .with_context(|| format!("failed to listen on {addr}"))?;

        Ok(Self {
            listener,
            config: Arc::new(config),
        })
    }

    /// Address the listener actually bound; port 0 resolves here.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("listener has no local address")
    }

    /// Accept loop. Runs until the task is dropped; a failed accept is
    /// logged and survived.
    pub async fn run(self) -> Result<()> {
        tracing::info!(
            addr = %self.local_addr()?,
            root = %self.config.root.display(),
            pool_size = self.config.pool_size,
            "listening"
        );

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("accept failed: {e}");
                    continue;
                }
            };
            let config = Arc::clone(&self.config);
            tokio::spawn(handle_connection(stream, peer, config));
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, config: Arc<EngineConfig>) {
    tracing::info!(%peer, "connection open");
    let _ = stream.set_nodelay(true);

    match Connection::new(stream, &config).run().await {
        Ok(stats) => {
            tracing::info!(
                %peer,
                files_ok = stats.files_ok,
                files_err = stats.files_err,
                bytes_written = stats.bytes_written,
                bytes_sent = stats.bytes_sent,
                "connection closed"
            );
        }
        Err(DepotError::EmptyReceive) => {
            tracing::warn!(%peer, "connection closed without a request");
        }
        Err(e) => {
            tracing::error!(%peer, "connection failed: {e}");
        }
    }
}
