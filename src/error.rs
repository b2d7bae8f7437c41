//! Error types for the depot service.
//!
//! Core modules return `DepotError` so the connection engine can pick a
//! recovery policy from the kind of failure: transport and protocol
//! errors end the connection, filesystem errors during an upload only
//! cost the one segment. The binary and the supervisor wrap everything
//! in `anyhow` at the edge.

use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DepotError>;

#[derive(Debug, Error)]
pub enum DepotError {
    /// Socket read or write failed mid-stream.
    #[error("transport error: {0}")]
    Transport(#[source] std::io::Error),

    /// The peer connected but nothing arrived before the idle timeout.
    #[error("connection closed with no data received")]
    EmptyReceive,

    /// The buffered request ended inside a header.
    #[error("truncated header in a {0} byte request")]
    TruncatedHeader(usize),

    /// Command token never terminated within the wire bound.
    #[error("command not terminated within {0} bytes")]
    CommandTooLong(usize),

    /// Filename never terminated within the wire bound.
    #[error("filename not terminated within {0} bytes")]
    FilenameTooLong(usize),

    #[error("filename is not valid UTF-8")]
    FilenameEncoding,

    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    /// A get or list frame showed up in the middle of an upload stream.
    #[error("unexpected {0} frame inside an upload")]
    MixedCommand(&'static str),

    /// The name reduces to nothing once directory components are gone.
    #[error("no usable filename in {0:?}")]
    BadFilename(String),

    /// A header promised more segment bytes than the request holds.
    #[error("segment of {declared} bytes exceeds the {remaining} still buffered")]
    SegmentOverrun { declared: u64, remaining: u64 },

    #[error("{op} {}: {source}", .path.display())]
    Filesystem {
        op: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    /// Write pool refused a job; only happens if its semaphore was closed.
    #[error("write pool closed")]
    PoolClosed,
}

impl DepotError {
    pub(crate) fn fs(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Filesystem {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}
