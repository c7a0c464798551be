//! Wire messages and protocol errors.
//!
//! The protocol uses four payloads, each carried in one transport frame:
//!
//! - `FetchFullDB`: the single marker byte [`FETCH_FULL_DB`], client to
//!   server; the server answers with `set_size` chunk frames in order.
//! - `DBChunk`: raw `chunk_size * entry_size` bytes, entry `k` at byte
//!   offset `k * entry_size`, zero-padded past the end of the database.
//! - [`SetParityQuery`]: bincode fixint encoding, i.e. a little-endian u64
//!   length prefix followed by the little-endian u64 indices.
//! - `SetParityResponse`: raw `entry_size` bytes, the XOR of the addressed
//!   entries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::TransportError;

/// Marker byte requesting a full database stream.
pub const FETCH_FULL_DB: u8 = 0x01;

/// One online query: the absolute indices whose XOR parity is requested,
/// one per chunk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetParityQuery {
    pub indices: Vec<u64>,
}

/// Errors surfaced by the query client. Soft protocol failures (no usable
/// hint, exhausted replacements) are not errors; they return a zero entry.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid index")]
    InvalidIndex,
    #[error("db chunk size mismatch")]
    ChunkSizeMismatch,
    #[error("reply parity length mismatch")]
    ParityLengthMismatch,
    #[error("thread pool error: {0}")]
    ThreadPool(String),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors returned by the server when processing requests.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("chunk size must be a positive power of two")]
    InvalidChunkSize,
    #[error("index out of range")]
    IndexOutOfRange,
    #[error("query must carry one index per chunk")]
    QueryLengthMismatch,
    #[error("entry size mismatch")]
    EntrySizeMismatch,
    #[error("malformed request")]
    MalformedRequest,
}
