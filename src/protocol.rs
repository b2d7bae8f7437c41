//! Wire format for depot requests and replies.
//!
//! A request is one or more headers, each followed by its raw segment
//! bytes:
//!
//! ```text
//! <command>\0<filename>\0<chunk_offset:u64><segment_length:u64>
//! ```
//!
//! Integers are little-endian. Upload connections repeat the frame once
//! per file segment, back to back; get and list carry a single header
//! and no segment bytes. Replies are unframed: raw file contents for
//! get, NUL-terminated names run together for list.

use crate::error::{DepotError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Longest command token on the wire, terminator excluded.
pub const MAX_COMMAND_LEN: usize = 8;

/// Longest filename on the wire, terminator excluded.
pub const MAX_FILENAME_LEN: usize = 4096;

/// Fixed bytes after the two terminated strings: two u64 fields.
pub const HEADER_TAIL_LEN: usize = 16;

/// Most entries a single list reply carries.
pub const MAX_LIST_ENTRIES: usize = 100;

/// Longest name included in a list reply, terminator excluded.
pub const MAX_LIST_NAME_LEN: usize = 255;

// =============================================================================
// Commands
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Put,
    Get,
    List,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Put => "put",
            Self::Get => "get",
            Self::List => "list",
        }
    }

    pub fn from_bytes(b: &[u8]) -> Option<Self> {
        match b {
            b"put" => Some(Self::Put),
            b"get" => Some(Self::Get),
            b"list" => Some(Self::List),
            _ => None,
        }
    }
}

// =============================================================================
// FrameHeader
// =============================================================================

/// One request header.
///
/// `segment_length` counts the raw bytes that follow the header on the
/// wire; it is zero for get and list. `chunk_offset` is the position the
/// segment lands at inside the destination file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub command: Command,
    pub filename: String,
    pub chunk_offset: u64,
    pub segment_length: u64,
}

impl FrameHeader {
    pub fn encode(&self) -> Bytes {
        let name_bytes = self.filename.as_bytes();
        let mut buf = BytesMut::with_capacity(
            self.command.as_str().len() + 1 + name_bytes.len() + 1 + HEADER_TAIL_LEN,
        );

        buf.put_slice(self.command.as_str().as_bytes());
        buf.put_u8(0);
        buf.put_slice(name_bytes);
        buf.put_u8(0);
        buf.put_u64_le(self.chunk_offset);
        buf.put_u64_le(self.segment_length);

        buf.freeze()
    }

    /// Decode one header from the front of `buf`.
    ///
    /// Returns the header and the number of bytes it occupied so the
    /// caller can step its cursor past it. Never reads beyond `buf`; a
    /// request that ends inside a header is a `TruncatedHeader` error.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let (cmd, after_cmd) =
            take_terminated(buf, 0, MAX_COMMAND_LEN, DepotError::CommandTooLong)?;
        let command = Command::from_bytes(cmd).ok_or_else(|| {
            DepotError::UnknownCommand(String::from_utf8_lossy(cmd).into_owned())
        })?;

        let (name, after_name) =
            take_terminated(buf, after_cmd, MAX_FILENAME_LEN, DepotError::FilenameTooLong)?;
        let filename = std::str::from_utf8(name)
            .map_err(|_| DepotError::FilenameEncoding)?
            .to_string();

        let mut tail = &buf[after_name..];
        if tail.remaining() < HEADER_TAIL_LEN {
            return Err(DepotError::TruncatedHeader(buf.len()));
        }
        let chunk_offset = tail.get_u64_le();
        let segment_length = tail.get_u64_le();

        Ok((
            Self {
                command,
                filename,
                chunk_offset,
                segment_length,
            },
            after_name + HEADER_TAIL_LEN,
        ))
    }
}

/// Slice out the field that starts at `start` and runs to the next NUL.
/// `max` bounds the field length, terminator excluded. Returns the field
/// and the offset just past its terminator.
fn take_terminated(
    buf: &[u8],
    start: usize,
    max: usize,
    too_long: fn(usize) -> DepotError,
) -> Result<(&[u8], usize)> {
    let window_end = buf.len().min(start.saturating_add(max + 1));
    let window = &buf[start.min(buf.len())..window_end];
    match window.iter().position(|&b| b == 0) {
        Some(pos) => Ok((&buf[start..start + pos], start + pos + 1)),
        None if window.len() <= max => Err(DepotError::TruncatedHeader(buf.len())),
        None => Err(too_long(max)),
    }
}

// =============================================================================
// List reply
// =============================================================================

/// Encode a list reply: every name NUL-terminated, run together.
pub fn encode_entries(names: &[String]) -> Bytes {
    let total: usize = names.iter().map(|n| n.len() + 1).sum();
    let mut buf = BytesMut::with_capacity(total);
    for name in names {
        buf.put_slice(name.as_bytes());
        buf.put_u8(0);
    }
    buf.freeze()
}

/// Split a list reply back into names.
pub fn decode_entries(reply: &[u8]) -> Vec<String> {
    reply
        .split(|&b| b == 0)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
