//! depot: a small network file store.
//!
//! Clients connect over TCP and either upload one or more files in a
//! single connection, download one file, or list the store's root
//! directory. Requests use NUL-delimited headers with little-endian
//! length fields; replies are unframed.
//!
//! # Architecture
//!
//! ```text
//! +----------+     +------------------------------------------+
//! | listener | --> | connection engine (one task per client)  |
//! +----------+     |   receive -> parse -> dispatch -> drain  |
//!                  +---------------------+--------------------+
//!                                        |
//!                           +------------+-----------+
//!                           | write pool (N permits) |
//!                           +------------------------+
//! ```
//!
//! The engine buffers the whole request, then walks it header by
//! header. Uploads fan segments out to a bounded write pool; downloads
//! and listings are answered synchronously on the same stream.

pub mod engine;
pub mod error;
pub mod protocol;
pub mod server;
pub mod store;
pub mod transport;

pub use engine::{ConnStats, Connection, EngineConfig};
pub use error::{DepotError, Result};
pub use protocol::{decode_entries, encode_entries, Command, FrameHeader};
pub use server::Server;
pub use store::pool::{WriteJob, WriteOutcome, WritePool, DEFAULT_POOL_SIZE};
pub use store::FileStore;
pub use transport::{recv_to_end, send_all, IDLE_TIMEOUT, RECV_CHUNK};
