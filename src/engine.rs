//! Per-connection protocol engine.
//!
//! A connection runs in phases: buffer the whole request, decode the
//! first header, then either walk the upload segments into the write
//! pool or answer a get/list synchronously. The pool is always drained
//! before the connection winds down, so every queued write lands (or
//! fails) while the engine is still watching.

use crate::error::{DepotError, Result};
use crate::protocol::{self, Command, FrameHeader};
use crate::store::pool::{WriteJob, WritePool, DEFAULT_POOL_SIZE};
use crate::store::FileStore;
use crate::transport;
use bytes::Bytes;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// Tunables shared by every connection.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory files are stored under.
    pub root: PathBuf,
    /// Concurrent write tasks per connection.
    pub pool_size: usize,
    /// Idle window that ends a request.
    pub idle_timeout: Duration,
}

impl EngineConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pool_size: DEFAULT_POOL_SIZE,
            idle_timeout: transport::IDLE_TIMEOUT,
        }
    }
}

/// What one connection did, for the close log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConnStats {
    pub files_ok: u64,
    pub files_err: u64,
    pub bytes_written: u64,
    pub bytes_sent: u64,
}

/// One client connection, from first byte to teardown.
///
/// Generic over the stream so tests can drive it over an in-memory
/// duplex pipe instead of a TCP socket.
pub struct Connection<S> {
    stream: S,
    store: FileStore,
    pool_size: usize,
    idle_timeout: Duration,
    stats: ConnStats,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    pub fn new(stream: S, config: &EngineConfig) -> Self {
        Self {
            stream,
            store: FileStore::new(&config.root),
            pool_size: config.pool_size,
            idle_timeout: config.idle_timeout,
            stats: ConnStats::default(),
        }
    }

    /// Drive the connection to completion.
    pub async fn run(mut self) -> Result<ConnStats> {
        let request = transport::recv_to_end(&mut self.stream, self.idle_timeout).await?;
        let (header, _) = FrameHeader::decode(&request)?;
        tracing::debug!(
            command = header.command.as_str(),
            filename = %header.filename,
            request_len = request.len(),
            "dispatching"
        );

        match header.command {
            Command::Put => self.serve_put(request).await?,
            Command::Get => self.serve_get(&header).await?,
            Command::List => self.serve_list().await?,
        }
        Ok(self.stats)
    }

    /// Walk the buffered upload, handing each segment to the write pool.
    ///
    /// A bad filename only costs that segment; a malformed header ends
    /// the walk. Either way the pool drains before this returns, so the
    /// segments already queued still land.
    async fn serve_put(&mut self, request: Bytes) -> Result<()> {
        let mut pool = WritePool::new(self.pool_size);
        let mut submitted = 0u64;
        let mut cursor = 0usize;

        let walk = loop {
            let (header, header_len) = match FrameHeader::decode(&request[cursor..]) {
                Ok(decoded) => decoded,
                Err(e) => break Err(e),
            };
            if header.command != Command::Put {
                break Err(DepotError::MixedCommand(header.command.as_str()));
            }

            let data_start = cursor + header_len;
            let remaining = (request.len() - data_start) as u64;
            if header.segment_length > remaining {
                break Err(DepotError::SegmentOverrun {
                    declared: header.segment_length,
                    remaining,
                });
            }
            let data_end = data_start + header.segment_length as usize;

            match self.store.resolve(&header.filename) {
                Ok(path) => {
                    let job = WriteJob {
                        path,
                        offset: header.chunk_offset,
                        data: request.slice(data_start..data_end),
                    };
                    if let Err(e) = pool.submit(job).await {
                        break Err(e);
                    }
                    submitted += 1;
                }
                Err(e) => {
                    tracing::warn!(filename = %header.filename, "skipping segment: {e}");
                    self.stats.files_err += 1;
                }
            }

            cursor = data_end;
            if cursor == request.len() {
                break Ok(());
            }
        };

        let outcomes = pool.drain().await;
        let ok = outcomes.iter().filter(|o| o.result.is_ok()).count() as u64;
        self.stats.files_ok += ok;
        self.stats.files_err += submitted - ok;
        self.stats.bytes_written += outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().copied())
            .sum::<u64>();

        tracing::info!(
            files_ok = self.stats.files_ok,
            files_err = self.stats.files_err,
            bytes = self.stats.bytes_written,
            "upload drained"
        );
        walk
    }

    /// Answer a download with the file's raw bytes. Any failure here is
    /// fatal to the connection; the peer sees a close with no data.
    async fn serve_get(&mut self, header: &FrameHeader) -> Result<()> {
        let path = self.store.resolve(&header.filename)?;
        let contents = self.store.read_file(&path).await?;
        let sent = transport::send_all(&mut self.stream, &contents).await?;
        self.stats.bytes_sent += sent as u64;
        tracing::info!(path = %path.display(), bytes = sent, "served file");
        Ok(())
    }

    /// Answer a listing. A root that cannot be read is logged and the
    /// empty reply still goes out.
    async fn serve_list(&mut self) -> Result<()> {
        let names = match self.store.list_names().await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!("listing failed: {e}");
                Vec::new()
            }
        };
        let reply = protocol::encode_entries(&names);
        let sent = transport::send_all(&mut self.stream, &reply).await?;
        self.stats.bytes_sent += sent as u64;
        tracing::info!(entries = names.len(), bytes = sent, "served listing");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
