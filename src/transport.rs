//! Stream receive and send primitives.
//!
//! The service buffers a connection's entire request before parsing any
//! of it. `recv_to_end` grows its buffer geometrically and treats EOF or
//! an idle gap as the end of the request; `send_all` does not return
//! until every reply byte is written and flushed.

use crate::error::{DepotError, Result};
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

/// Initial receive capacity, and the headroom floor that triggers a
/// doubling.
pub const RECV_CHUNK: usize = 4096;

/// How long to wait for further bytes before treating the request as
/// complete.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Read until the peer closes its half of the stream or goes idle.
///
/// Every read is bounded by `idle`; a peer that stops sending without
/// closing still ends the request after one idle window. The frozen
/// buffer is returned as-is. A request with no bytes at all is an
/// `EmptyReceive` error.
pub async fn recv_to_end<R>(stream: &mut R, idle: Duration) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(RECV_CHUNK);

    loop {
        if buf.capacity() - buf.len() < RECV_CHUNK {
            buf.reserve(buf.capacity());
        }
        match timeout(idle, stream.read_buf(&mut buf)).await {
            Err(_) => break,
            Ok(Ok(0)) => break,
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(DepotError::Transport(e)),
        }
    }

    if buf.is_empty() {
        return Err(DepotError::EmptyReceive);
    }
    Ok(buf.freeze())
}

/// Write the whole reply and flush it. Returns the byte count sent.
pub async fn send_all<W>(stream: &mut W, reply: &[u8]) -> Result<usize>
where
    W: AsyncWrite + Unpin,
{
    stream
        .write_all(reply)
        .await
        .map_err(DepotError::Transport)?;
    stream.flush().await.map_err(DepotError::Transport)?;
    Ok(reply.len())
}

// =============================================================================
// Tests
// =============================================================================
