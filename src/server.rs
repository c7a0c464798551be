//! Server side of the protocol: parity answers and chunk streaming.

use crate::entry::DbEntry;
use crate::messages::{ServerError, SetParityQuery, FETCH_FULL_DB};
use crate::transport::{Transport, TransportError};
use std::collections::VecDeque;

pub trait Db {
    fn num_entries(&self) -> u64;
    fn entry_size(&self) -> usize;
    fn entry(&self, index: u64) -> Result<&[u8], ServerError>;
}

#[derive(Debug)]
pub struct InMemoryDb {
    entry_size: usize,
    entries: Vec<u8>,
}

impl InMemoryDb {
    pub fn new(entries: Vec<u8>, entry_size: usize) -> Result<Self, ServerError> {
        if entry_size == 0 || entries.len() % entry_size != 0 {
            return Err(ServerError::EntrySizeMismatch);
        }
        Ok(Self { entry_size, entries })
    }
}

impl Db for InMemoryDb {
    fn num_entries(&self) -> u64 {
        (self.entries.len() / self.entry_size) as u64
    }

    fn entry_size(&self) -> usize {
        self.entry_size
    }

    fn entry(&self, index: u64) -> Result<&[u8], ServerError> {
        if index >= self.num_entries() {
            return Err(ServerError::IndexOutOfRange);
        }
        let start = index as usize * self.entry_size;
        Ok(&self.entries[start..start + self.entry_size])
    }
}

/// Answers `SetParityQuery` requests and streams the database in chunks.
///
/// The served index domain is `[0, chunk_size * set_size)`; entries past the
/// database end read as zero, so the last chunk is zero-padded and padded
/// indices contribute nothing to a parity.
pub struct Server<D: Db> {
    db: D,
    chunk_size: u64,
    set_size: u64,
}

impl<D: Db> Server<D> {
    pub fn new(db: D, chunk_size: u64) -> Result<Self, ServerError> {
        if chunk_size == 0 || !chunk_size.is_power_of_two() {
            return Err(ServerError::InvalidChunkSize);
        }
        let set_size = db.num_entries().div_ceil(chunk_size);
        Ok(Self { db, chunk_size, set_size })
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn set_size(&self) -> u64 {
        self.set_size
    }

    /// One streamed chunk: `chunk_size` entries starting at
    /// `chunk_id * chunk_size`, zero-padded past the database end.
    pub fn db_chunk(&self, chunk_id: u64) -> Result<Vec<u8>, ServerError> {
        if chunk_id >= self.set_size {
            return Err(ServerError::IndexOutOfRange);
        }
        let entry_size = self.db.entry_size();
        let mut chunk = vec![0u8; self.chunk_size as usize * entry_size];
        let base = chunk_id * self.chunk_size;
        for k in 0..self.chunk_size {
            let index = base + k;
            if index >= self.db.num_entries() {
                break;
            }
            let start = k as usize * entry_size;
            chunk[start..start + entry_size].copy_from_slice(self.db.entry(index)?);
        }
        Ok(chunk)
    }

    /// XOR parity of the addressed entries. Every query carries exactly one
    /// index per chunk; duplicates cancel pairwise.
    pub fn set_parity(&self, indices: &[u64]) -> Result<Vec<u8>, ServerError> {
        if indices.len() != self.set_size as usize {
            return Err(ServerError::QueryLengthMismatch);
        }
        let padded = self.chunk_size * self.set_size;
        let mut parity = DbEntry::zero(self.db.entry_size());
        for &index in indices {
            if index >= padded {
                return Err(ServerError::IndexOutOfRange);
            }
            if index < self.db.num_entries() {
                parity.xor_raw(self.db.entry(index)?);
            }
        }
        Ok(parity.into_bytes())
    }

    /// Dispatch one request payload, returning the reply frames in order.
    pub fn handle_request(&self, payload: &[u8]) -> Result<Vec<Vec<u8>>, ServerError> {
        if payload == [FETCH_FULL_DB] {
            (0..self.set_size).map(|i| self.db_chunk(i)).collect()
        } else {
            let query: SetParityQuery =
                bincode::deserialize(payload).map_err(|_| ServerError::MalformedRequest)?;
            Ok(vec![self.set_parity(&query.indices)?])
        }
    }
}

/// In-process [`Transport`] wrapping a [`Server`], for tests and
/// single-process sessions. Counts the traffic it carries and retains every
/// parity query for inspection.
pub struct LocalSession<D: Db> {
    server: Server<D>,
    inbox: VecDeque<Vec<u8>>,
    pub fetch_requests: u64,
    pub chunks_sent: u64,
    pub parity_queries: u64,
    pub sent_queries: Vec<Vec<u64>>,
}

impl<D: Db> LocalSession<D> {
    pub fn new(server: Server<D>) -> Self {
        Self {
            server,
            inbox: VecDeque::new(),
            fetch_requests: 0,
            chunks_sent: 0,
            parity_queries: 0,
            sent_queries: Vec::new(),
        }
    }

    pub fn server(&self) -> &Server<D> {
        &self.server
    }
}

impl<D: Db> Transport for LocalSession<D> {
    fn send_raw(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if payload == [FETCH_FULL_DB] {
            self.fetch_requests += 1;
        } else {
            self.parity_queries += 1;
            if let Ok(query) = bincode::deserialize::<SetParityQuery>(payload) {
                self.sent_queries.push(query.indices);
            }
        }
        let replies = self
            .server
            .handle_request(payload)
            .map_err(|e| TransportError::Server(e.to_string()))?;
        if payload == [FETCH_FULL_DB] {
            self.chunks_sent += replies.len() as u64;
        }
        self.inbox.extend(replies);
        Ok(())
    }

    fn recv_raw(&mut self) -> Result<Vec<u8>, TransportError> {
        self.inbox.pop_front().ok_or(TransportError::Protocol)
    }
}
